use crate::page::{ConsoleApi, PageChannel};
use std::sync::Arc;
use tabrec_common::formatter::{JsValue, format_console_args};
use tabrec_common::protocol::{LogLevel, PageMessage};

/// Calls the original console method, then broadcasts the call.
pub struct InterceptedConsole {
    original: Arc<dyn ConsoleApi>,
    channel: PageChannel,
}

impl InterceptedConsole {
    pub fn new(original: Arc<dyn ConsoleApi>, channel: PageChannel) -> Self {
        Self { original, channel }
    }
}

impl ConsoleApi for InterceptedConsole {
    fn call(&self, level: LogLevel, args: &[JsValue]) {
        self.original.call(level, args);
        self.channel
            .post(PageMessage::console(level, format_console_args(args)));
    }
}
