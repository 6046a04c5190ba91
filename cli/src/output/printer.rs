//! Line renderer for the notification stream and device status table.

use bosflash_common::Notification;
use owo_colors::OwoColorize as _;

use crate::application::ports::NotificationSink;
use crate::application::services::orchestrator::DeviceReport;
use crate::output::OutputContext;

/// Writes one line per notification to stdout.
#[derive(Clone)]
pub struct NotificationPrinter {
    ctx: OutputContext,
}

impl NotificationPrinter {
    #[must_use]
    pub fn new(ctx: OutputContext) -> Self {
        Self { ctx }
    }

    /// `[<address>] - <message>`, the address styled per device.
    #[must_use]
    pub fn render(&self, notification: &Notification) -> String {
        let label = format!("[{}]", notification.address);
        format!(
            "{} - {}",
            label.style(self.ctx.styles.device(notification.device_id)),
            notification.message
        )
    }

    /// One status-table row: id, address, state, and pause flag.
    #[must_use]
    pub fn render_status(&self, report: &DeviceReport) -> String {
        let mut flags = Vec::new();
        if report.paused {
            flags.push("paused");
        }
        if report.status.stalled {
            flags.push("stalled");
        }
        let label = format!("[{}]", report.info.address);
        format!(
            "{:>2} {} {:<8} {}",
            report.info.id,
            label.style(self.ctx.styles.device(report.info.id)),
            report.status.state.to_string(),
            flags.join(", ").style(self.ctx.styles.warning)
        )
        .trim_end()
        .to_string()
    }

    /// Print `notification` unless quiet.
    pub fn print(&self, notification: &Notification) {
        if !self.ctx.quiet {
            println!("{}", self.render(notification));
        }
    }

    /// Print the status table. Shown even when quiet, since it was asked for.
    pub fn print_status(&self, reports: &[DeviceReport]) {
        for report in reports {
            println!("{}", self.render_status(report));
        }
    }

    #[must_use]
    pub fn context(&self) -> &OutputContext {
        &self.ctx
    }
}

impl NotificationSink for NotificationPrinter {
    fn notify(&self, notification: Notification) {
        self.print(&notification);
    }
}
