//! Injected capabilities
//!
//! Components receive a [`Pausable`] and an [`Authorizable`] instead of
//! inheriting pause/ownership behaviour.

use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{EngineError, EngineResult};

/// Something that can halt intake
pub trait Pausable: Send + Sync {
    fn is_paused(&self) -> bool;

    /// Human-readable component name for errors
    fn component(&self) -> &str;

    fn ensure_not_paused(&self) -> EngineResult<()> {
        if self.is_paused() {
            return Err(EngineError::ComponentPaused(self.component().to_string()));
        }
        Ok(())
    }
}

/// Privileged operations gated by [`Authorizable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ResumeBreaker,
    PauseIntake,
    ResumeIntake,
    Blacklist,
    RetryDeliveries,
    PublishPrice,
    IndexBalances,
    FundPool,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ResumeBreaker => "resume the circuit breaker",
            Action::PauseIntake => "pause intake",
            Action::ResumeIntake => "resume intake",
            Action::Blacklist => "blacklist a subject",
            Action::RetryDeliveries => "retry failed deliveries",
            Action::PublishPrice => "publish oracle prices",
            Action::IndexBalances => "index balance history",
            Action::FundPool => "fund the lending pool",
        }
    }
}

pub trait Authorizable: Send + Sync {
    fn authorize(&self, actor: &str, action: Action) -> EngineResult<()>;
}

/// Operator allow-list
#[derive(Debug, Default)]
pub struct OperatorRegistry {
    operators: RwLock<HashSet<String>>,
}

impl OperatorRegistry {
    pub fn new<I, S>(operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operators: RwLock::new(operators.into_iter().map(Into::into).collect()),
        }
    }

    pub fn add(&self, operator: &str) {
        self.operators
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operator.to_string());
    }

    pub fn is_operator(&self, actor: &str) -> bool {
        self.operators
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(actor)
    }
}

impl Authorizable for OperatorRegistry {
    fn authorize(&self, actor: &str, action: Action) -> EngineResult<()> {
        if self.is_operator(actor) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized {
                actor: actor.to_string(),
                action: action.as_str().to_string(),
            })
        }
    }
}

/// Manually toggled pause flag
#[derive(Debug)]
pub struct PauseSwitch {
    name: String,
    paused: AtomicBool,
}

impl PauseSwitch {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            paused: AtomicBool::new(false),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}

impl Pausable for PauseSwitch {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn component(&self) -> &str {
        &self.name
    }
}
