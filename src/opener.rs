//! Opens URLs with the platform's default handler.

use std::io;

use crate::error::Result;

/// Hands a URL to something that can show it.
pub trait Launcher {
    fn launch(&self, url: &str) -> io::Result<()>;
}

/// Uses the desktop's default browser through [`open::that`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, url: &str) -> io::Result<()> {
        open::that(url)
    }
}

/// Opens URLs in the user's browser.
#[derive(Clone, Debug, Default)]
pub struct Opener<L = SystemLauncher> {
    launcher: L,
}

impl Opener {
    /// An opener for the desktop this process runs on.
    #[must_use]
    pub fn system() -> Self {
        Self::new(SystemLauncher)
    }
}

impl<L: Launcher> Opener<L> {
    #[must_use]
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    /// Opens `url`, or prints it when no handler could be launched.
    ///
    /// The login can still complete from a browser elsewhere, so a launch
    /// failure is not an error.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` matches the URL handler signature of
    /// [`Credential::on_login_url`](crate::credential::Credential::on_login_url).
    pub fn open(&self, url: &str) -> Result<()> {
        debug!("opening login page in the default browser");
        if let Err(e) = self.launcher.launch(url) {
            warn!("could not open a browser: {e}");
            println!("Please visit the following URL and log in:\n\n{url}\n");
        }

        Ok(())
    }
}
