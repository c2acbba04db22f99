//! Rendering of sink-facing status strings.
//!
//! Wording is load-bearing: recovery matches the tracking announcement by
//! exact content, and change detection compares rendered output against
//! what the sink currently shows.

use statuswatch_status::StatusSnapshot;

/// Shown in a status message while the target cannot be fetched.
pub const FETCH_ERROR_TEXT: &str = "Fehler beim Abrufen des Serverstatus.";

/// Terminal text written when a status-message job expires.
pub const EXPIRED_TEXT: &str = "Der Befehl ist abgelaufen.";

/// Posted once when a channel starts mirroring the player count.
pub const TRACKING_ANNOUNCEMENT: &str =
    "Der Kanalname wird nun entsprechend der Spielerzahl aktualisiert.";

/// Channel label used while the target server is offline.
pub const OFFLINE_LABEL: &str = "offline";

/// Status line for a tracked server.
pub fn server_status_text(address: &str, snapshot: &StatusSnapshot) -> String {
    if snapshot.online {
        format!(
            "Der Server {} ist online mit {} Spieler(n).",
            address, snapshot.player_count
        )
    } else {
        format!("Der Server {} ist offline.", address)
    }
}

/// Channel label mirroring the player count.
pub fn channel_label(prefix: &str, snapshot: &StatusSnapshot) -> String {
    if snapshot.online {
        format!("{}-{}-spielen", prefix, snapshot.player_count)
    } else {
        OFFLINE_LABEL.to_string()
    }
}

/// One-shot MOTD line.
pub fn motd_text(snapshot: &StatusSnapshot) -> String {
    if snapshot.online {
        format!("Server MOTD: {}", snapshot.motd)
    } else {
        "Der Server ist offline.".to_string()
    }
}
