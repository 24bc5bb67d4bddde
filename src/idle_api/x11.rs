use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::instrument;
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::{Drawable, Window},
    Connection,
};

use super::IdleSource;

/// Reads idle time through the MIT-SCREEN-SAVER extension.
pub struct X11IdleSource {
    connection: Connection,
    preferred_screen: i32,
}

impl X11IdleSource {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) =
            Connection::connect_with_extensions(None, &[xcb::Extension::ScreenSaver], &[])?;
        Ok(Self {
            connection,
            preferred_screen,
        })
    }

    fn root_window(&self) -> Result<Window> {
        // Currently the application only supports 1 x11 screen.
        self.connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .map(|screen| screen.root())
            .ok_or_else(|| anyhow!("Screen {} doesn't exist", self.preferred_screen))
    }
}

impl IdleSource for X11IdleSource {
    #[instrument(skip(self))]
    fn get_idle_time(&mut self) -> Result<Duration> {
        let root = self.root_window()?;
        let idle = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(idle)?;
        Ok(Duration::from_millis(reply.ms_since_user_input() as u64))
    }
}
