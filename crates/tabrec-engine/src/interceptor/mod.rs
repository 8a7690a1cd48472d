//! Page-realm decorators for the logging and network primitives.
//!
//! Installation is a one-way `Uninstalled -> Installed` transition recorded in
//! the page's own globals, so every injection attempt sees the same guard.

mod console;
mod network;

pub use console::InterceptedConsole;
pub use network::{InterceptedFetch, InterceptedXhrFactory};

use crate::page::{InterceptorState, PageContext};
use async_trait::async_trait;
use std::sync::Arc;
use tabrec_common::error::RecorderError;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
}

pub struct Interceptor;

impl Interceptor {
    pub fn install(page: &PageContext) -> InstallOutcome {
        let channel = page.channel();
        let mut globals = page.globals();

        if globals.interceptor == InterceptorState::Installed {
            info!("Console override already injected, skipping duplicate");
            return InstallOutcome::AlreadyInstalled;
        }

        globals.console = Arc::new(InterceptedConsole::new(
            globals.console.clone(),
            channel.clone(),
        ));
        globals.fetch = Arc::new(InterceptedFetch::new(globals.fetch.clone(), channel.clone()));
        globals.xhr = Arc::new(InterceptedXhrFactory::new(globals.xhr.clone(), channel));
        globals.interceptor = InterceptorState::Installed;

        info!("Console override injected successfully on {}", page.url());
        InstallOutcome::Installed
    }
}

/// Loads the interceptor into a page. Completion is asynchronous, like a
/// script element's load/error signal.
#[async_trait]
pub trait InterceptorInjector: Send + Sync {
    async fn inject(&self, page: &PageContext) -> Result<InstallOutcome, RecorderError>;
}

pub struct ScriptInjector;

#[async_trait]
impl InterceptorInjector for ScriptInjector {
    async fn inject(&self, page: &PageContext) -> Result<InstallOutcome, RecorderError> {
        tokio::task::yield_now().await;
        if page.scripts_blocked() {
            return Err(RecorderError::InjectionFailed(format!(
                "Failed to load injected script on {}",
                page.url()
            )));
        }
        Ok(Interceptor::install(page))
    }
}
