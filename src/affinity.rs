//! Connection affinity registry.
//!
//! Binds the executor of the active unit of work to the current logical call
//! chain so nested repository calls can find it without threading it through
//! every signature. A call chain is one tokio task-local scope: bindings never
//! leak to other tasks, including tasks spawned from inside a unit of work.

use std::cell::RefCell;
use std::future::Future;

use crate::{Error, Executor, Result};

tokio::task_local! {
    static BINDING: RefCell<Option<Executor>>;
}

/// Runs `fut` inside a call-chain scope.
///
/// When the caller is already inside a scope, that scope is reused so an
/// existing binding stays visible (and a second `bind` is rejected).
pub async fn scope<F: Future>(fut: F) -> F::Output {
    if BINDING.try_with(|_| ()).is_ok() {
        fut.await
    } else {
        BINDING.scope(RefCell::new(None), fut).await
    }
}

/// Associates `executor` with the current call chain.
pub fn bind(executor: Executor) -> Result<()> {
    BINDING
        .try_with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(Error::AlreadyBound);
            }
            tracing::trace!(tx_id = %executor.id(), "bound connection to call chain");
            *slot = Some(executor);
            Ok(())
        })
        .unwrap_or(Err(Error::Unscoped))
}

/// Binds `executor`; the returned guard unbinds on drop, including during
/// unwinding or cancellation of the operation holding it.
pub(crate) fn bind_scoped(executor: Executor) -> Result<BindingGuard> {
    bind(executor)?;
    Ok(BindingGuard { _private: () })
}

#[must_use = "the binding is cleared as soon as the guard is dropped"]
pub(crate) struct BindingGuard {
    _private: (),
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        unbind();
    }
}

/// The executor bound to the current call chain.
pub fn current() -> Result<Executor> {
    BINDING
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten()
        .ok_or(Error::NoActiveTransaction)
}

pub fn is_bound() -> bool {
    BINDING
        .try_with(|slot| slot.borrow().is_some())
        .unwrap_or(false)
}

/// Clears the binding. Safe to call when nothing is bound or outside any scope.
pub fn unbind() {
    let _ = BINDING.try_with(|slot| {
        if let Some(executor) = slot.borrow_mut().take() {
            tracing::trace!(tx_id = %executor.id(), "unbound connection from call chain");
        }
    });
}
