//! Tape staging requests.

use super::{Context, batch_head, spread};
use crate::error::{Error, Result};
use crate::metadata::{StageBatch, StageStatus};
use crate::observability::{self, DispatchTimer};
use crate::plugin::Operation;
use std::time::Duration;

impl Context {
    /// Ask the storage to bring `url` online (stage it from tape to disk).
    ///
    /// `pin_time` is how long the file should stay online once staged and
    /// `timeout` bounds the request on the storage side. With `asynchronous`
    /// set the call returns right away and the returned token is used with
    /// [`bring_online_poll`](Self::bring_online_poll).
    pub fn bring_online(
        &self,
        url: &str,
        pin_time: Duration,
        timeout: Duration,
        asynchronous: bool,
    ) -> Result<StageStatus> {
        self.dispatch_url("bring_online", Operation::BringOnline, url, |backend| {
            backend.bring_online(url, pin_time, timeout, asynchronous)
        })
    }

    /// Check an asynchronous staging request. True once the file is online.
    pub fn bring_online_poll(&self, url: &str, token: &str) -> Result<bool> {
        self.dispatch_url("bring_online_poll", Operation::BringOnline, url, |backend| {
            backend.bring_online_poll(url, token)
        })
    }

    /// Release the pin held by a staging request.
    pub fn release_file(&self, url: &str, token: &str) -> Result<()> {
        self.dispatch_url("release_file", Operation::BringOnline, url, |backend| {
            backend.release_file(url, token)
        })
    }

    /// Stage several files in one request.
    ///
    /// The backend is chosen from the first URL and receives the whole list;
    /// there is no per-file fallback. If no backend claims the first URL the
    /// batch carries no token and every file gets that error.
    pub fn bring_online_list(
        &self,
        urls: &[&str],
        pin_time: Duration,
        timeout: Duration,
        asynchronous: bool,
    ) -> StageBatch<Error> {
        const OPERATION: &str = "bring_online_list";
        let _span = observability::instrument_dispatch(OPERATION, batch_head(urls));
        let plugin = match self.resolve_batch(OPERATION, Operation::BringOnline, urls) {
            Ok(plugin) => plugin,
            Err(files) => return StageBatch { token: None, files },
        };
        observability::record_dispatch(OPERATION, plugin.name());
        let _timer = DispatchTimer::start(OPERATION);

        let (token, files) =
            match plugin.backend().bring_online_list(urls, pin_time, timeout, asynchronous) {
                Ok(batch) => (batch.token, Ok(batch.files)),
                Err(err) => (None, Err(err)),
            };
        StageBatch {
            token,
            files: spread(OPERATION, plugin.name(), urls.len(), files),
        }
    }

    /// Check a batch staging request, one online flag per URL.
    pub fn bring_online_poll_list(&self, urls: &[&str], token: &str) -> Vec<Result<bool>> {
        self.dispatch_batch("bring_online_poll_list", Operation::BringOnline, urls, |backend| {
            backend.bring_online_poll_list(urls, token)
        })
    }

    /// Release the pins held by a batch staging request.
    pub fn release_file_list(&self, urls: &[&str], token: &str) -> Vec<Result<()>> {
        self.dispatch_batch("release_file_list", Operation::BringOnline, urls, |backend| {
            backend.release_file_list(urls, token)
        })
    }

    /// Cancel the staging of `urls` under `token`.
    pub fn abort_files(&self, urls: &[&str], token: &str) -> Vec<Result<()>> {
        self.dispatch_batch("abort_files", Operation::BringOnline, urls, |backend| {
            backend.abort_files(urls, token)
        })
    }
}
