use super::{Negotiator, Transition};

const STARTTLS_COMMAND: &str = ". STARTTLS\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapState {
    Init,
    StarttlsSent,
    TlsUp,
}

/// Compute the next IMAP state for one chunk of server output
#[must_use]
pub fn transition(state: ImapState, chunk: &[u8]) -> Transition<ImapState> {
    let text = String::from_utf8_lossy(chunk);

    match state {
        ImapState::Init if text.contains("STARTTLS") => {
            Transition::send(ImapState::StarttlsSent, STARTTLS_COMMAND)
        }
        ImapState::StarttlsSent if is_tagged_ok(&text) => Transition::to(ImapState::TlsUp),
        _ => Transition::to(state),
    }
}

/// Any line carrying the `.` tag with an `OK` completion
fn is_tagged_ok(text: &str) -> bool {
    text.lines().any(|line| line.starts_with(". OK"))
}

/// IMAP negotiator; only the banner (first chunk) may offer STARTTLS
#[derive(Debug)]
pub struct ImapNegotiator {
    state: ImapState,
    banner_seen: bool,
}

impl Default for ImapNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl ImapNegotiator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ImapState::Init,
            banner_seen: false,
        }
    }
}

impl Negotiator for ImapNegotiator {
    type State = ImapState;

    const PROTOCOL: &'static str = "imap";

    fn state(&self) -> ImapState {
        self.state
    }

    fn feed(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        let banner = !std::mem::replace(&mut self.banner_seen, true);

        // a banner without STARTTLS leaves nothing to wait for but the timeout
        if self.state == ImapState::Init && !banner {
            return None;
        }

        let Transition { next, outbound } = transition(self.state, chunk);
        self.state = next;
        outbound
    }

    fn is_upgraded(&self) -> bool {
        self.state == ImapState::TlsUp
    }
}
