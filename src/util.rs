// failsched: Connectivity-Preserving Link-Failure Schedules for Network Simulation Experiments
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Utility module collection of functions

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use clap::Parser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

/// Logging configuration loaded by [`init_logging`] if it exists in the working directory.
pub const LOG_CONFIG: &str = "log4rs.yml";

/// Initialize logging from `log4rs.yml`, or with `pretty_env_logger` (controlled by `RUST_LOG`) if
/// that file is missing or invalid.
pub fn init_logging() {
    if Path::new(LOG_CONFIG).exists() {
        match log4rs::init_file(LOG_CONFIG, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Cannot load {LOG_CONFIG}, using the default logger: {e}"),
        }
    }
    pretty_env_logger::init();
}

/// Initialize `pretty_env_logger` (default level `info`) behind the returned [`MultiProgress`],
/// so log lines do not tear the progress bars added to it.
pub fn init_logging_with_progress() -> Result<MultiProgress, log::SetLoggerError> {
    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .build();
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    Ok(multi)
}

/// Parse the command line arguments. Usage errors print the usage and exit with code 1, while
/// `--help` and `--version` exit with code 0.
pub fn parse_args<T: Parser>() -> T {
    match try_parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            // printing only fails if the terminal is gone
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Parse the given arguments, the first being the program name.
pub fn try_parse_args<T, I, A>(args: I) -> Result<T, clap::Error>
where
    T: Parser,
    I: IntoIterator<Item = A>,
    A: Into<OsString> + Clone,
{
    T::try_parse_from(args)
}

/// Timestamp used to name output files.
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

pub trait PathBufExt: Sized {
    fn then(self, p: impl AsRef<Path>) -> PathBuf;

    /// Append `suffix` to the file name, e.g., `out.log` becomes `out.log.summary.csv`.
    fn with_appended(self, suffix: &str) -> PathBuf;

    fn then_ts(self, p: impl AsRef<str>, ts: &str) -> PathBuf {
        self.then(p.as_ref().replacen("{}", ts, 1))
    }
}

impl PathBufExt for PathBuf {
    fn then(mut self, p: impl AsRef<Path>) -> PathBuf {
        self.push(p);
        self
    }

    fn with_appended(self, suffix: &str) -> PathBuf {
        let mut s = self.into_os_string();
        s.push(suffix);
        PathBuf::from(s)
    }
}

impl PathBufExt for &Path {
    fn then(self, p: impl AsRef<Path>) -> PathBuf {
        let mut path = self.to_path_buf();
        path.push(p);
        path
    }

    fn with_appended(self, suffix: &str) -> PathBuf {
        self.to_path_buf().with_appended(suffix)
    }
}
