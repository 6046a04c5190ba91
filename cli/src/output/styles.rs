//! Output styles using owo-colors stylesheet pattern

use owo_colors::Style;

/// Centralized stylesheet for CLI output colors.
#[derive(Default, Clone)]
pub struct Styles {
    /// Success messages (green)
    pub success: Style,
    /// Warning messages (yellow)
    pub warning: Style,
    /// Error messages (red)
    pub error: Style,
    /// Info messages (blue)
    pub info: Style,
    /// Dimmed/secondary text
    pub dim: Style,
    /// Bold text
    pub bold: Style,
    /// Per-device address labels, cycled by device id
    pub devices: [Style; 4],
}

impl Styles {
    /// Apply colors to the stylesheet.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.error = Style::new().red();
        self.info = Style::new().blue();
        self.dim = Style::new().dimmed();
        self.bold = Style::new().bold();
        self.devices = [
            Style::new().bold().cyan(),
            Style::new().bold().magenta(),
            Style::new().bold().truecolor(26, 151, 179),
            Style::new().bold().truecolor(37, 56, 144),
        ];
    }

    /// Label style for 1-based device `id`.
    #[must_use]
    pub fn device(&self, id: usize) -> Style {
        self.devices[id.saturating_sub(1) % self.devices.len()]
    }
}
