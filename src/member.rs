use crate::{Error, Result};

/// A member row: an immutable identifier and a mutable balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    member_id: String,
    pub money: i64,
}

impl Member {
    pub fn new(member_id: impl Into<String>, money: i64) -> Result<Self> {
        let member_id = member_id.into();
        if member_id.trim().is_empty() {
            return Err(Error::InvalidMember("member_id must not be empty".to_string()));
        }
        Ok(Self { member_id, money })
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }
}
