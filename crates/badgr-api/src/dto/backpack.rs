//! 背包接受状态更新

use serde::Deserialize;

use badgr_core::FieldErrors;
use badgr_core::models::Acceptance;

const ACCEPTED: &str = "Accepted";

/// 只接受字面值 "Accepted"
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptanceRequest {
    pub acceptance: Option<String>,
}

impl AcceptanceRequest {
    pub fn validated(&self) -> Result<Acceptance, FieldErrors> {
        match self.acceptance.as_deref() {
            Some(ACCEPTED) => Ok(Acceptance::Accepted),
            Some(other) => Err(FieldErrors::single(
                "acceptance",
                format!("\"{}\" is not a valid choice.", other),
            )),
            None => Err(FieldErrors::single("acceptance", "This field is required.")),
        }
    }
}
