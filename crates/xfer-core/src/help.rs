//! Maps a failing stage to a documentation page.

use crate::classify::{is_refused_message, is_timeout_message};
use crate::types::{Protocol, StageKey};

pub fn resolve_help_link(protocol: Protocol, stage: StageKey, message: &str) -> Option<&'static str> {
    let link = match stage {
        StageKey::NameResolution => "/guides/dns-resolution-failed",
        StageKey::Transport if is_refused_message(message) => {
            if protocol.is_ftp_family() {
                "/errors/econnrefused-port-21"
            } else {
                "/errors/econnrefused-port-22"
            }
        }
        StageKey::Transport if is_timeout_message(message) => "/guides/tcp-connection-timeout-firewall",
        StageKey::Transport => "/guides/tcp-connection-failed",
        StageKey::Credential if message.contains("530") => "/errors/530-login-incorrect",
        StageKey::Credential => "/guides/authentication-failed",
        StageKey::Enumeration if protocol.is_ftp_family() => "/guides/ftp-passive-mode-firewall-issues",
        StageKey::Enumeration => "/guides/sftp-directory-listing-failed",
    };
    Some(link)
}
