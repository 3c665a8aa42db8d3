use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::enums::TaskCategory;
use crate::error::HustleError;
use crate::ids::Cid;

pub const MIN_DIFFICULTY: u16 = 1;
pub const MAX_DIFFICULTY: u16 = 1000;
pub const MIN_DESCRIPTION_LEN: usize = 10;

/// Task submission as typed by the worker, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskForm {
    pub client_address: String,
    pub category: u8,
    pub difficulty_weight: u16,
    /// Response deadline, seconds since epoch.
    pub deadline: u64,
    pub description: String,
    /// Manifest CID from an earlier attempt whose proof is already pinned.
    /// When set, no files are uploaded again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_reference: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidTaskForm {
    pub client: Address,
    pub category: TaskCategory,
    pub difficulty_weight: u16,
    pub deadline: u64,
    pub description: String,
    pub proof_reference: Option<Cid>,
}

impl CreateTaskForm {
    pub fn validate(&self, now: u64) -> Result<ValidTaskForm, HustleError> {
        let client = parse_address(&self.client_address)?;
        let category = TaskCategory::from_index(self.category)?;

        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&self.difficulty_weight) {
            return Err(HustleError::InvalidInput(format!(
                "difficulty weight must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}"
            )));
        }
        if self.deadline <= now {
            return Err(HustleError::InvalidInput("deadline must be in the future".into()));
        }
        let description = self.description.trim();
        if description.chars().count() < MIN_DESCRIPTION_LEN {
            return Err(HustleError::InvalidInput(format!(
                "description must be at least {MIN_DESCRIPTION_LEN} characters"
            )));
        }

        let proof_reference = match self.proof_reference.as_deref().map(str::trim) {
            None => None,
            Some(cid) if !cid.is_empty() && cid.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Some(Cid(cid.to_string()))
            }
            Some(cid) => {
                return Err(HustleError::InvalidInput(format!("invalid proof reference: {cid:?}")));
            }
        };

        Ok(ValidTaskForm {
            client,
            category,
            difficulty_weight: self.difficulty_weight,
            deadline: self.deadline,
            description: description.to_string(),
            proof_reference,
        })
    }
}

/// Accepts exactly `0x` followed by 40 hex digits, in any case.
pub fn parse_address(s: &str) -> Result<Address, HustleError> {
    let invalid = || HustleError::InvalidInput(format!("invalid address: {s:?}"));
    let hex = s.strip_prefix("0x").ok_or_else(invalid)?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    s.parse::<Address>().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> CreateTaskForm {
        CreateTaskForm {
            client_address: "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC".into(),
            category: 1,
            difficulty_weight: 100,
            deadline: 2_000,
            description: "Landing page redesign".into(),
            proof_reference: None,
        }
    }

    #[test]
    fn accepts_a_complete_form() {
        let valid = form().validate(1_000).unwrap();
        assert_eq!(valid.category, TaskCategory::Design);
        assert_eq!(valid.difficulty_weight, 100);
    }

    #[test]
    fn rejects_malformed_client() {
        for bad in ["", "3C44CdDdB6a900fa2b585dd299e03d12FA4293BC", "0x1234", "0xZZ44CdDdB6a900fa2b585dd299e03d12FA4293BC"] {
            let mut f = form();
            f.client_address = bad.into();
            assert!(f.validate(1_000).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let mut f = form();
        f.difficulty_weight = 0;
        assert!(f.validate(1_000).is_err());

        let mut f = form();
        f.difficulty_weight = 1001;
        assert!(f.validate(1_000).is_err());

        let mut f = form();
        f.category = 6;
        assert!(f.validate(1_000).is_err());

        let mut f = form();
        f.deadline = 1_000;
        assert!(f.validate(1_000).is_err());

        let mut f = form();
        f.description = "  too short ".into();
        assert!(f.validate(1_000).is_err());
    }

    #[test]
    fn proof_reference_is_optional_and_checked() {
        assert_eq!(form().validate(1_000).unwrap().proof_reference, None);

        let mut f = form();
        f.proof_reference = Some(" bafymem00000002 ".into());
        assert_eq!(
            f.validate(1_000).unwrap().proof_reference,
            Some(Cid("bafymem00000002".into()))
        );

        for bad in ["", "   ", "ipfs://bafy", "bafy/../x"] {
            let mut f = form();
            f.proof_reference = Some(bad.into());
            assert!(f.validate(1_000).is_err(), "{bad:?}");
        }
    }
}
