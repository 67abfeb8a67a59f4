use tracing::{info, trace, warn};

/// Number of addressable data lines below the status line
pub const DATA_LINES: u8 = 8;

const TITLE_Y: u16 = 10;
const STATUS_Y: u16 = 20;
const DATA_START_Y: u16 = 30;
const LINE_HEIGHT: u16 = 10;

/// Something that can show a line of text at a vertical position
pub trait TextSurface: Send {
    fn clear(&mut self);
    /// Replaces whatever was shown at `y` with `text`
    fn write_line(&mut self, y: u16, text: &str);
}

/// Surface that writes each line to the log
#[derive(Debug, Default)]
pub struct LogSurface;

impl TextSurface for LogSurface {
    fn clear(&mut self) {
        info!("[display] cleared");
    }

    fn write_line(&mut self, y: u16, text: &str) {
        info!("[display y={y}] {text}");
    }
}

/// Line-addressed display: a title, a status line and eight data lines
pub struct PaperDisplay<S: TextSurface> {
    top_title: String,
    surface: S,
}

impl<S: TextSurface> PaperDisplay<S> {
    pub fn new(top_title: impl Into<String>, surface: S) -> Self {
        Self {
            top_title: top_title.into(),
            surface,
        }
    }

    pub fn top_title(&self) -> &str {
        &self.top_title
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn setup(&mut self) {
        trace!("Display setup started");
        let title = self.top_title.clone();
        self.write_title_line(&title);
        self.write_status_line("Initializing...");
    }

    pub fn clear(&mut self) {
        self.surface.clear();
    }

    pub fn write_title_line(&mut self, title: &str) {
        self.surface.write_line(TITLE_Y, title);
    }

    pub fn write_status_line(&mut self, status: &str) {
        self.surface.write_line(STATUS_Y, status);
    }

    /// Writes data line `line`, counted from 1
    pub fn write_data_line(&mut self, line: u8, data: &str) -> anyhow::Result<()> {
        if !(1..=DATA_LINES).contains(&line) {
            warn!("Invalid line number: {line}");
            anyhow::bail!("Display line {line} out of range 1..={DATA_LINES}");
        }
        let y = DATA_START_Y + u16::from(line - 1) * LINE_HEIGHT;
        self.surface.write_line(y, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSurface {
        lines: Vec<(u16, String)>,
        clears: usize,
    }

    impl TextSurface for RecordingSurface {
        fn clear(&mut self) {
            self.clears += 1;
        }

        fn write_line(&mut self, y: u16, text: &str) {
            self.lines.push((y, text.to_string()));
        }
    }

    #[test]
    fn test_setup_writes_title_and_status() {
        let mut display = PaperDisplay::new("Hot Water", RecordingSurface::default());
        display.setup();
        assert_eq!(display.top_title(), "Hot Water");
        assert_eq!(
            display.surface().lines,
            vec![
                (10, "Hot Water".to_string()),
                (20, "Initializing...".to_string())
            ]
        );
    }

    #[test]
    fn test_data_line_positions() {
        let mut display = PaperDisplay::new("", RecordingSurface::default());
        display.write_data_line(1, "first").unwrap();
        display.write_data_line(8, "last").unwrap();
        assert_eq!(
            display.surface().lines,
            vec![(30, "first".to_string()), (100, "last".to_string())]
        );
    }

    #[test]
    fn test_data_line_out_of_range() {
        let mut display = PaperDisplay::new("", RecordingSurface::default());
        assert!(display.write_data_line(0, "x").is_err());
        assert!(display.write_data_line(9, "x").is_err());
        assert!(display.surface().lines.is_empty());

        display.clear();
        assert_eq!(display.surface().clears, 1);
    }
}
