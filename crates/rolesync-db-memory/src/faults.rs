//! Scripted failures for exercising the reconciler's error paths.

use std::sync::Mutex;

use rolesync_core::Kind;
use rolesync_storage::StoreError;

/// Store operations a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetOwner,
    Get,
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    kind: Option<Kind>,
    error: StoreError,
    remaining: usize,
}

/// Queue of pending faults, consumed in insertion order.
#[derive(Debug, Default)]
pub(crate) struct FaultTable {
    faults: Mutex<Vec<Fault>>,
}

impl FaultTable {
    pub(crate) fn push(
        &self,
        operation: Operation,
        kind: Option<Kind>,
        error: StoreError,
        times: usize,
    ) {
        if times == 0 {
            return;
        }
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.push(Fault {
            operation,
            kind,
            error,
            remaining: times,
        });
    }

    /// Returns the error of the first fault matching the call, if any.
    pub(crate) fn take(&self, operation: Operation, kind: Option<Kind>) -> Option<StoreError> {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        let index = faults.iter().position(|f| {
            f.operation == operation && (f.kind.is_none() || kind.is_none() || f.kind == kind)
        })?;

        let fault = &mut faults[index];
        let error = fault.error.clone();
        fault.remaining -= 1;
        if fault.remaining == 0 {
            faults.remove(index);
        }
        Some(error)
    }

    pub(crate) fn clear(&self) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub(crate) fn pending(&self) -> usize {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|f| f.remaining)
            .sum()
    }
}
