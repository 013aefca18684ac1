/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
}

impl WindowSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Build from the u32 dimensions carried by SSH requests, saturating at u16::MAX.
    pub fn from_request(col_width: u32, row_height: u32) -> Self {
        Self {
            cols: u16::try_from(col_width).unwrap_or(u16::MAX),
            rows: u16::try_from(row_height).unwrap_or(u16::MAX),
        }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// A pty-req as received on a session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub size: WindowSize,
}

/// Everything the bridge needs to know about one accepted session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub conn_id: String,
    /// Username the client claimed during authentication.
    pub user: String,
    pub pty: Option<PtyRequest>,
}

/// Per-connection authentication state
#[derive(Debug, Default)]
pub struct ClientSession {
    pub username: Option<String>,
    pub authenticated: bool,
    pub ssh_key_fingerprint: Option<String>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticate(&mut self, username: &str, fingerprint: String) {
        self.username = Some(username.to_string());
        self.authenticated = true;
        self.ssh_key_fingerprint = Some(fingerprint);
    }
}
