use crate::types::SessionState;

/// Edges of the capture lifecycle:
/// `Idle → Requesting → Active → Recording → Ending → Idle`, plus the
/// early exits (failed or cancelled negotiation, stop before tracking).
pub fn is_allowed_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState as S;

    match from {
        S::Idle => matches!(to, S::Requesting),
        S::Requesting => matches!(to, S::Active | S::Idle),
        S::Active => matches!(to, S::Recording | S::Ending),
        S::Recording => matches!(to, S::Ending),
        S::Ending => matches!(to, S::Idle),
    }
}

pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), String> {
    if !is_allowed_transition(from, to) {
        return Err(format!(
            "illegal transition: {} -> {}",
            from.as_str(),
            to.as_str()
        ));
    }
    Ok(())
}
