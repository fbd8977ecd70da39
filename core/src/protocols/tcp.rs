//! TCP flag encoding.
//!
//! Translator workers hand the engine the raw 8-bit flag field of each
//! segment. Only the flag predicates matter here; header parsing happens
//! upstream.

// TCP flags.
pub const CWR: u8 = 0b1000_0000;
pub const ECE: u8 = 0b0100_0000;
pub const URG: u8 = 0b0010_0000;
pub const ACK: u8 = 0b0001_0000;
pub const PSH: u8 = 0b0000_1000;
pub const RST: u8 = 0b0000_0100;
pub const SYN: u8 = 0b0000_0010;
pub const FIN: u8 = 0b0000_0001;

/// Returns `true` if `flags` indicates connection termination.
#[inline]
pub fn is_termination(flags: u8) -> bool {
    flags & (FIN | RST) != 0
}

/// Returns `true` if `flags` carries any of SYN, FIN, or RST. Segments that
/// open or close a connection never install trace-tracking state.
#[inline]
pub fn is_syn_fin_rst(flags: u8) -> bool {
    flags & (SYN | FIN | RST) != 0
}

/// Compact textual form of `flags`, e.g. `"FIN|ACK"`.
pub fn flags_str(flags: u8) -> String {
    const NAMES: [(u8, &str); 8] = [
        (CWR, "CWR"),
        (ECE, "ECE"),
        (URG, "URG"),
        (ACK, "ACK"),
        (PSH, "PSH"),
        (RST, "RST"),
        (SYN, "SYN"),
        (FIN, "FIN"),
    ];
    let set: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    set.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_covers_fin_and_rst() {
        assert!(is_termination(FIN | ACK));
        assert!(is_termination(RST));
        assert!(!is_termination(SYN | ACK));
        assert!(!is_termination(PSH | ACK));
    }

    #[test]
    fn syn_fin_rst_excludes_data_segments() {
        assert!(is_syn_fin_rst(SYN));
        assert!(is_syn_fin_rst(FIN | ACK));
        assert!(is_syn_fin_rst(RST | ACK));
        assert!(!is_syn_fin_rst(PSH | ACK));
    }

    #[test]
    fn flags_format() {
        assert_eq!(flags_str(FIN | ACK), "ACK|FIN");
        assert_eq!(flags_str(0), "");
    }
}
