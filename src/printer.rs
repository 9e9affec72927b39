/*!
    sink for the lines an axis reports to its operator

    Every axis gets its own printer, so an application can route each axis to a different console, file or widget. Wire-level traces do not go there, they are emitted with the `log` macros.
*/

use core::fmt;
use log::Level;

/// receives formatted lines from one axis
pub trait Printer: Send + Sync {
    fn print(&self, level: Level, line: fmt::Arguments<'_>);
}

/// printer forwarding to the `log` facade, each line prefixed with the axis name
#[derive(Clone, Debug)]
pub struct LogPrinter {
    prefix: String,
}
impl LogPrinter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {prefix: prefix.into()}
    }
}
impl Printer for LogPrinter {
    fn print(&self, level: Level, line: fmt::Arguments<'_>) {
        log::log!(level, "[{}] {}", self.prefix, line);
    }
}
