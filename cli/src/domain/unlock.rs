//! Interpretation of the SSH unlock helper's output.

/// Substring printed by the helper when the miner's web UI password must be
/// reset with the physical reset button before SSH can be unlocked.
pub const FACTORY_RESET_MARKER: &str = "webUI";

/// Credential name passed to the helper.
pub const UNLOCK_USER: &str = "root";

/// Returns `true` when the helper's combined output reports a successful
/// unlock, i.e. it does not contain [`FACTORY_RESET_MARKER`].
#[must_use]
pub fn unlock_succeeded(combined_output: &str) -> bool {
    !combined_output.contains(FACTORY_RESET_MARKER)
}
