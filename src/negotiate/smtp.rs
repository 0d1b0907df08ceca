use super::{Negotiator, Transition};

/// SMTP STARTTLS states
///
/// `EHLO` is sent on entering `Greeted`, so that state also covers waiting
/// for the EHLO capability list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    Init,
    Greeted,
    StarttlsSent,
    TlsUp,
}

/// Compute the next SMTP state for one chunk of server output
#[must_use]
pub fn transition(state: SmtpState, chunk: &[u8], client_name: &str) -> Transition<SmtpState> {
    let text = String::from_utf8_lossy(chunk);

    match state {
        SmtpState::Init if is_esmtp_greeting(&text) => {
            Transition::send(SmtpState::Greeted, format!("EHLO {client_name}\r\n"))
        }
        SmtpState::Greeted if text.contains("250-STARTTLS") => {
            Transition::send(SmtpState::StarttlsSent, "STARTTLS\r\n")
        }
        SmtpState::StarttlsSent if text.starts_with("220 ") => Transition::to(SmtpState::TlsUp),
        _ => Transition::to(state),
    }
}

/// `220 <hostname> ESMTP ...`
fn is_esmtp_greeting(text: &str) -> bool {
    let Some(rest) = text.strip_prefix("220 ") else {
        return false;
    };
    let mut words = rest.split_ascii_whitespace();
    words.next().is_some() && words.next().is_some_and(|word| word.starts_with("ESMTP"))
}

#[derive(Debug)]
pub struct SmtpNegotiator {
    state: SmtpState,
    client_name: String,
}

impl SmtpNegotiator {
    #[must_use]
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            state: SmtpState::Init,
            client_name: client_name.into(),
        }
    }
}

impl Negotiator for SmtpNegotiator {
    type State = SmtpState;

    const PROTOCOL: &'static str = "smtp";

    fn state(&self) -> SmtpState {
        self.state
    }

    fn feed(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        let Transition { next, outbound } = transition(self.state, chunk, &self.client_name);
        self.state = next;
        outbound
    }

    fn is_upgraded(&self) -> bool {
        self.state == SmtpState::TlsUp
    }
}
