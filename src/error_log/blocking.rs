//! Synchronous facade over an async error log.
//!
//! The facade owns a current-thread tokio runtime and blocks on the async
//! operations, so blocking and async callers see the same results and the
//! same errors. Do not call it from inside an async context.

use tokio::runtime::{Builder, Runtime};

use super::{ErrorEvent, ErrorLog, ErrorLogEntry, Result};

/// Blocking wrapper around any [`ErrorLog`].
pub struct BlockingErrorLog<L> {
    inner: L,
    runtime: Runtime,
}

impl<L: ErrorLog> BlockingErrorLog<L> {
    /// Wrap `inner`, starting a private runtime for it.
    pub fn new(inner: L) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn application_name(&self) -> &str {
        self.inner.application_name()
    }

    pub fn log(&self, error: &ErrorEvent) -> Result<String> {
        self.runtime.block_on(self.inner.log(error))
    }

    pub fn get_error(&self, id: &str) -> Result<Option<ErrorLogEntry>> {
        self.runtime.block_on(self.inner.get_error(id))
    }

    pub fn get_errors(
        &self,
        page_index: usize,
        page_size: usize,
        sink: &mut Vec<ErrorLogEntry>,
    ) -> Result<usize> {
        self.runtime
            .block_on(self.inner.get_errors(page_index, page_size, sink))
    }
}
