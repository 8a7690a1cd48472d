use anyhow::Result;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tabrec_engine::browser::SimulatedBrowser;
use tabrec_engine::config::RecorderConfig;
use tabrec_engine::controller::{Controller, StopOutcome};
use tabrec_engine::export::ExportOutcome;
use tabrec_engine::formatter::{JsValue, format_log_entry, format_network_entry};
use tabrec_engine::page::FetchRequest;
use tabrec_engine::persistence::MemoryStorage;
use tabrec_engine::store::{BadgeIndicator, Store, StoreService};
use tracing::warn;

const DEMO_URL: &str = "https://shop.example.com/checkout";

/// Record a scripted session in a simulated tab, print it and export it.
pub async fn run(config: &RecorderConfig, out: &Path) -> Result<()> {
    let badges = Arc::new(BadgeIndicator::new());
    let store = Store::hydrate(
        &config.buffers,
        Arc::new(MemoryStorage::new()),
        badges.clone(),
    )
    .await;
    let (store, _service) = StoreService::spawn(store);

    let browser = SimulatedBrowser::new(store.clone(), config.relay.clone());
    browser
        .network()
        .respond("https://shop.example.com/api/cart", 200, r#"{"items":2}"#);
    browser
        .network()
        .fail("https://tracker.example.net/beacon", "TypeError: Failed to fetch");

    let controller = Controller::new(browser.clone(), store.clone(), config.relay.clone());
    let tab = browser.open_tab(DEMO_URL);

    controller.start_recording(tab).await?;
    if let Some(badge) = badges.badge(tab) {
        println!("Tab {} badge: {} ({})", tab, badge.text, badge.color);
    }

    if let Some(page) = browser.page(tab) {
        let console = page.console();
        console.log(&["Checkout loaded".into(), JsValue::from(json!({"items": 2, "total": 59.9}))]);
        console.warn(&["Coupon expires in".into(), JsValue::from(3i64), "days".into()]);

        let _ = page
            .fetch(FetchRequest::get("https://shop.example.com/api/cart"))
            .await;
        let _ = page
            .fetch(FetchRequest::new("POST", "https://tracker.example.net/beacon").with_body("{}"))
            .await;

        let mut xhr = page.new_xhr();
        xhr.open("GET", "https://shop.example.com/api/missing");
        xhr.send(None).await;

        console.error(&["Payment widget failed:".into(), JsValue::Undefined]);
    }

    // The relay forwards every pending page event before it handles the stop.
    match controller.stop_recording(tab).await? {
        StopOutcome::Stopped => {}
        StopOutcome::StoppedWithWarnings(warning) => warn!("Stopped with warnings: {}", warning),
    }
    println!("{}", controller.ui_state(tab).await?.status_text());

    let logs = store.get_logs().await?;
    println!("\nConsole ({} entries):", logs.console_logs.len());
    for entry in &logs.console_logs {
        println!("  {}", format_log_entry(entry));
    }
    println!("\nNetwork ({} entries):", logs.network_logs.len());
    for entry in &logs.network_logs {
        println!("  {}", format_network_entry(entry));
    }

    match controller.export(DEMO_URL, out).await? {
        ExportOutcome::Written(path) => println!("\nExported to {}", path.display()),
        ExportOutcome::NoData => println!("\nNo data to export"),
    }
    Ok(())
}
