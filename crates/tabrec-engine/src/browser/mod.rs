//! In-process browser host: owns tabs and their pages, injects relays, and
//! reports tab lifecycle events to the store.

mod network;

pub use network::{Route, RouteTable};

use crate::controller::TabHost;
use crate::interceptor::{InterceptorInjector, ScriptInjector};
use crate::page::PageContext;
use crate::relay::{Relay, RelayHandle, RelayOptions};
use crate::store::{StoreHandle, TabEvent, TabNavigator};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tabrec_common::config::schema::RelayConfig;
use tabrec_common::error::RecorderError;
use tabrec_common::protocol::{RelayRequest, RelayResponse, TabId};
use tracing::{debug, info, warn};

struct TabSlot {
    page: PageContext,
    relay: Option<RelayHandle>,
    scripts_blocked: bool,
}

struct BrowserInner {
    store: StoreHandle,
    injector: Arc<dyn InterceptorInjector>,
    relay_config: RelayConfig,
    network: RouteTable,
    tabs: Mutex<HashMap<TabId, TabSlot>>,
    next_tab: AtomicU32,
}

impl BrowserInner {
    fn tabs(&self) -> MutexGuard<'_, HashMap<TabId, TabSlot>> {
        self.tabs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_page(&self, url: &str, scripts_blocked: bool) -> PageContext {
        PageContext::builder(url)
            .fetcher(Arc::new(self.network.clone()))
            .xhr(Arc::new(self.network.clone()))
            .block_scripts(scripts_blocked)
            .build()
    }

    fn spawn_relay(&self, tab: TabId, recording: bool) -> Result<(), RecorderError> {
        let mut tabs = self.tabs();
        let slot = tabs.get_mut(&tab).ok_or_else(|| no_such_tab(tab))?;

        if let Some(relay) = &slot.relay
            && !relay.is_closed()
        {
            debug!("Relay already running in tab {}", tab);
            return Ok(());
        }

        let options = RelayOptions {
            injection_delay: self.relay_config.injection_delay(),
            recording,
        };
        match Relay::spawn(
            slot.page.clone(),
            self.store.clone(),
            self.injector.clone(),
            options,
        ) {
            Some(handle) => {
                slot.relay = Some(handle);
                Ok(())
            }
            None => Err(RecorderError::Other(format!(
                "Relay slot in tab {} is held by a dead relay",
                tab
            ))),
        }
    }
}

fn no_such_tab(tab: TabId) -> RecorderError {
    RecorderError::Other(format!("No tab with id: {}", tab))
}

struct BrowserNavigator {
    inner: Weak<BrowserInner>,
}

#[async_trait]
impl TabNavigator for BrowserNavigator {
    async fn reestablish(&self, tab: TabId) -> Result<(), RecorderError> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| RecorderError::Disconnected("browser".into()))?;
        inner.spawn_relay(tab, true)
    }
}

#[derive(Clone)]
pub struct SimulatedBrowser {
    inner: Arc<BrowserInner>,
}

impl SimulatedBrowser {
    pub fn new(store: StoreHandle, relay_config: RelayConfig) -> Self {
        Self::with_injector(store, relay_config, Arc::new(ScriptInjector))
    }

    pub fn with_injector(
        store: StoreHandle,
        relay_config: RelayConfig,
        injector: Arc<dyn InterceptorInjector>,
    ) -> Self {
        let inner = Arc::new(BrowserInner {
            store,
            injector,
            relay_config,
            network: RouteTable::new(),
            tabs: Mutex::new(HashMap::new()),
            next_tab: AtomicU32::new(1),
        });

        let navigator = Arc::new(BrowserNavigator {
            inner: Arc::downgrade(&inner),
        });
        if let Err(e) = inner.store.attach_navigator(navigator) {
            warn!("Store unavailable, navigation will not re-inject: {}", e);
        }

        Self { inner }
    }

    pub fn network(&self) -> &RouteTable {
        &self.inner.network
    }

    pub fn open_tab(&self, url: &str) -> TabId {
        let mut tab = self.inner.next_tab.fetch_add(1, Ordering::SeqCst);
        while self.inner.tabs().contains_key(&tab) {
            tab = self.inner.next_tab.fetch_add(1, Ordering::SeqCst);
        }
        self.open_tab_with_id(tab, url);
        tab
    }

    /// Open (or replace) a tab under a caller-chosen id.
    pub fn open_tab_with_id(&self, tab: TabId, url: &str) {
        let page = self.inner.new_page(url, false);
        let previous = self.inner.tabs().insert(
            tab,
            TabSlot {
                page,
                relay: None,
                scripts_blocked: false,
            },
        );
        if let Some(previous) = previous {
            previous.page.unload();
        }
        info!("Opened tab {} at {}", tab, url);
    }

    pub fn page(&self, tab: TabId) -> Option<PageContext> {
        self.inner.tabs().get(&tab).map(|slot| slot.page.clone())
    }

    pub fn has_relay(&self, tab: TabId) -> bool {
        self.inner
            .tabs()
            .get(&tab)
            .and_then(|slot| slot.relay.as_ref())
            .is_some_and(|relay| !relay.is_closed())
    }

    /// Block script injection in this tab, now and after later navigations.
    pub fn block_scripts(&self, tab: TabId, blocked: bool) -> Result<(), RecorderError> {
        let mut tabs = self.inner.tabs();
        let slot = tabs.get_mut(&tab).ok_or_else(|| no_such_tab(tab))?;
        slot.scripts_blocked = blocked;
        slot.page.set_scripts_blocked(blocked);
        Ok(())
    }

    /// Full navigation: the old document unloads, a fresh one replaces it and
    /// the store hears about the completed navigation.
    pub fn navigate(&self, tab: TabId, url: &str) -> Result<(), RecorderError> {
        {
            let mut tabs = self.inner.tabs();
            let slot = tabs.get_mut(&tab).ok_or_else(|| no_such_tab(tab))?;
            slot.page.unload();
            slot.page = self.inner.new_page(url, slot.scripts_blocked);
            slot.relay = None;
        }
        info!("Tab {} navigated to {}", tab, url);
        self.inner
            .store
            .tab_event(TabEvent::NavigationComplete(tab))
    }

    pub fn close_tab(&self, tab: TabId) -> Result<(), RecorderError> {
        let slot = self
            .inner
            .tabs()
            .remove(&tab)
            .ok_or_else(|| no_such_tab(tab))?;
        slot.page.unload();
        info!("Closed tab {}", tab);
        self.inner.store.tab_event(TabEvent::Removed(tab))
    }
}

#[async_trait]
impl TabHost for SimulatedBrowser {
    async fn tab_url(&self, tab: TabId) -> Result<String, RecorderError> {
        self.page(tab)
            .map(|page| page.url().to_string())
            .ok_or_else(|| no_such_tab(tab))
    }

    async fn send_to_relay(
        &self,
        tab: TabId,
        request: RelayRequest,
    ) -> Result<RelayResponse, RecorderError> {
        let relay = {
            let tabs = self.inner.tabs();
            let slot = tabs.get(&tab).ok_or_else(|| no_such_tab(tab))?;
            slot.relay.clone()
        };
        match relay {
            Some(relay) => relay.request(request).await,
            None => Err(RecorderError::Disconnected(
                "Could not establish connection. Receiving end does not exist.".into(),
            )),
        }
    }

    async fn inject_relay(&self, tab: TabId) -> Result<(), RecorderError> {
        self.inner.spawn_relay(tab, false)
    }
}
