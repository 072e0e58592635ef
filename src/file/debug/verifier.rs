use tracing::warn;

use crate::{dex_err, error::DexError, Result};

use super::{DecodedDebugInfo, LocalEntry, MethodShape, PositionEntry, NO_INDEX};

/// Cross-checks freshly decoded tables against the tables the stream was
/// encoded from.
///
/// Parameters are always decoded as starting at address 0, so for registers at
/// or above the parameter base a decoded start of 0 matches any original start.
/// Decoded locals with no original counterpart are only accepted for unnamed
/// parameters and the implicit `this`.
pub fn verify_decoded(
    decoded: &DecodedDebugInfo,
    positions: &[PositionEntry],
    locals: &[LocalEntry],
    method: &MethodShape,
) -> Result<()> {
    let result = check_positions(&decoded.positions, positions)
        .and_then(|_| check_locals(&decoded.locals, locals, method));
    if let Err(err) = &result {
        warn!("{err}");
    }
    result
}

fn check_positions(decoded: &[PositionEntry], original: &[PositionEntry]) -> Result<()> {
    if decoded.len() != original.len() {
        return dex_err!(
            ValidationMismatch,
            "decoded positions table has {} entries, expected {}",
            decoded.len(),
            original.len()
        );
    }

    let mut decoded = decoded.to_vec();
    let mut original = original.to_vec();
    decoded.sort_by_key(|entry| (entry.address, entry.line));
    original.sort_by_key(|entry| (entry.address, entry.line));

    for (got, expected) in decoded.iter().zip(&original) {
        if got != expected {
            return dex_err!(
                ValidationMismatch,
                "could not match position entry {:?}, decoded {:?}",
                expected,
                got
            );
        }
    }
    Ok(())
}

fn check_locals(decoded: &[LocalEntry], original: &[LocalEntry], method: &MethodShape) -> Result<()> {
    let param_base = method.param_base()?;
    let mut used = vec![false; decoded.len()];

    let claim = |used: &mut [bool], matches: &dyn Fn(&LocalEntry) -> bool| -> bool {
        let found = decoded
            .iter()
            .enumerate()
            .find(|(idx, local)| !used[*idx] && matches(*local));
        match found {
            Some((idx, _)) => {
                used[idx] = true;
                true
            }
            None => false,
        }
    };

    for local in original {
        let same_range = |other: &LocalEntry| {
            other.register == local.register && other.end == local.end
        };
        let exact = |other: &LocalEntry| same_range(other) && other.start == local.start;
        let param = |other: &LocalEntry| {
            same_range(other) && other.start == 0 && other.register >= param_base
        };

        if !claim(&mut used, &exact) && !claim(&mut used, &param) {
            return dex_err!(ValidationMismatch, "could not match local {:?}", local);
        }
    }

    for (local, _) in decoded.iter().zip(&used).filter(|(_, used)| !**used) {
        let this_reg = !method.is_static && local.register == param_base;
        let implied = local.start == 0
            && local.register >= param_base
            && (local.name_index == NO_INDEX
                || (this_reg && local.name_index == method.this_name_index));
        if !implied {
            return dex_err!(ValidationMismatch, "unexpected decoded local {:?}", local);
        }
    }
    Ok(())
}
