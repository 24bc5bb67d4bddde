//! Answers a single question: how long ago did the user last touch the keyboard or mouse.
//! [GenericIdleSource] picks the back end enabled at compile time.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::time::Duration;

use anyhow::Result;

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait IdleSource {
    /// Retrieve amount of time passed since the last input event.
    fn get_idle_time(&mut self) -> Result<Duration>;
}

/// Serves as a cross-compatible IdleSource implementation.
pub struct GenericIdleSource {
    inner: Box<dyn IdleSource>,
}

impl GenericIdleSource {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsIdleSource;
                Ok(Self {
                    inner: Box::new(WindowsIdleSource::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11IdleSource;
                Ok(Self {
                    inner: Box::new(X11IdleSource::new()?),
                })
            }
            else {
                // Keeps the crate buildable for tests on machines without a supported back end.
                Err(anyhow::anyhow!("No idle source was enabled, build with the `x11` or `win` feature"))
            }
        }
    }
}

impl IdleSource for GenericIdleSource {
    fn get_idle_time(&mut self) -> Result<Duration> {
        self.inner.get_idle_time()
    }
}
