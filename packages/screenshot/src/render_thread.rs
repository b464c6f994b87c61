//! Dedicated render thread
//!
//! Everything that touches a component tree runs here. Callers on other
//! threads hand over a job plus a one-shot reply channel and block until the
//! job finishes; jobs run in submission order.

use crate::{Result, ScreenshotError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct RenderThread {
    sender: Option<Sender<Job>>,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    /// Spawn a named render thread
    pub fn spawn(name: &str) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in receiver {
                    job();
                }
                debug!("Render thread shutting down");
            })?;

        Ok(Self {
            sender: Some(sender),
            thread_id: handle.thread().id(),
            handle: Some(handle),
        })
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Run `f` on the render thread and wait for its result.
    ///
    /// Runs inline when already on the render thread. A panic inside `f` is
    /// reported to the caller as [`ScreenshotError::RenderThreadPanicked`].
    pub fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current() {
            return f();
        }

        let (reply, response) = mpsc::sync_channel::<Result<T>>(1);
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
                Err(ScreenshotError::RenderThreadPanicked(panic_message(
                    payload.as_ref(),
                )))
            });
            // The caller is blocked on the other end; a closed channel only
            // means it went away.
            let _ = reply.send(result);
        });

        self.sender
            .as_ref()
            .ok_or(ScreenshotError::RenderThreadGone)?
            .send(job)
            .map_err(|_| ScreenshotError::RenderThreadGone)?;

        response
            .recv()
            .map_err(|_| ScreenshotError::RenderThreadGone)?
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        // Closing the queue ends the thread's loop
        self.sender.take();

        if let Some(handle) = self.handle.take() {
            if !self.is_current() {
                let _ = handle.join();
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
