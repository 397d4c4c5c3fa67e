use crate::{Error, MemberRepository, Result, TransactionCoordinator};

/// Destination id the transfer validation refuses.
pub const REJECTED_MEMBER_ID: &str = "ex";

/// Account transfer between two members.
pub struct MemberService<'a> {
    coordinator: &'a TransactionCoordinator,
    repository: MemberRepository,
}

impl<'a> MemberService<'a> {
    pub fn new(coordinator: &'a TransactionCoordinator) -> Self {
        Self {
            coordinator,
            repository: MemberRepository::new(),
        }
    }

    /// Move `amount` from one member to another atomically.
    pub async fn account_transfer(&self, from_id: &str, to_id: &str, amount: i64) -> Result<()> {
        self.coordinator
            .run_in_transaction(|| self.business_logic(from_id, to_id, amount))
            .await
    }

    /// Same transfer without a transaction: if validation fails the debit stays applied.
    pub async fn account_transfer_auto_commit(
        &self,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> Result<()> {
        self.coordinator
            .run_auto_commit(|| self.business_logic(from_id, to_id, amount))
            .await
    }

    /// The transfer itself, unaware of where its connection comes from.
    pub async fn business_logic(&self, from_id: &str, to_id: &str, amount: i64) -> Result<()> {
        let from_member = self.repository.find_by_id(from_id).await?;
        let to_member = self.repository.find_by_id(to_id).await?;

        let debited = from_member
            .money
            .checked_sub(amount)
            .ok_or_else(|| Error::DomainValidation(format!("balance of {from_id} would overflow")))?;
        self.repository.update(from_id, debited).await?;

        validation(to_member.member_id())?;

        let credited = to_member
            .money
            .checked_add(amount)
            .ok_or_else(|| Error::DomainValidation(format!("balance of {to_id} would overflow")))?;
        self.repository.update(to_id, credited).await?;

        tracing::info!(from_id, to_id, amount, "transfer applied");
        Ok(())
    }
}

fn validation(to_id: &str) -> Result<()> {
    if to_id == REJECTED_MEMBER_ID {
        return Err(Error::DomainValidation(format!(
            "transfers to member {to_id} are not allowed"
        )));
    }
    Ok(())
}
