//! Caller-side single-flight guard
//!
//! At most one operation per (user, kind) may be in flight. Holding a
//! `FlightPermit` reserves the slot; dropping it releases the slot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::PreconditionError;
use crate::types::OperationKind;

type FlightKey = (String, OperationKind);

#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    in_flight: Arc<Mutex<HashSet<FlightKey>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the (user, kind) slot or fail with `AlreadyInFlight`
    pub fn try_acquire(
        &self,
        user: &str,
        kind: OperationKind,
    ) -> Result<FlightPermit, PreconditionError> {
        let key = (user.to_string(), kind);
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.clone()) {
            return Err(PreconditionError::AlreadyInFlight {
                user: user.to_string(),
                kind,
            });
        }
        debug!(user, kind = %kind, "flight slot acquired");
        Ok(FlightPermit {
            in_flight: self.in_flight.clone(),
            key,
        })
    }

    pub fn is_in_flight(&self, user: &str, kind: OperationKind) -> bool {
        let set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(&(user.to_string(), kind))
    }
}

/// RAII reservation of one (user, kind) slot
#[derive(Debug)]
pub struct FlightPermit {
    in_flight: Arc<Mutex<HashSet<FlightKey>>>,
    key: FlightKey,
}

impl FlightPermit {
    pub fn kind(&self) -> OperationKind {
        self.key.1
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
        debug!(user = %self.key.0, kind = %self.key.1, "flight slot released");
    }
}
