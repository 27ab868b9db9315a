pub(crate) const IAC: u8 = 0xff;
pub(crate) const DONT: u8 = 0xfe;
pub(crate) const DO: u8 = 0xfd;
pub(crate) const WONT: u8 = 0xfc;
pub(crate) const WILL: u8 = 0xfb;
pub(crate) const SB: u8 = 0xfa;
pub(crate) const SE: u8 = 0xf0;

/// A chunk counts as negotiation when it leads with IAC and the second byte
/// is not the doubled-IAC literal escape.
pub(crate) fn is_negotiation(chunk: &[u8]) -> bool {
    chunk.first() == Some(&IAC) && chunk.get(1) != Some(&IAC)
}

/// RFC 1143 section 7 escape clause: refuse to start performing, acknowledge
/// the peer performing. DONT and WONT are acknowledgments and need no answer.
fn refusal_verb(verb: u8) -> Option<u8> {
    match verb {
        DO => Some(WONT),
        WILL => Some(DO),
        _ => None,
    }
}

/// Walks a negotiation chunk and builds the reply for every
/// `IAC <verb> <option>` triplet in it. Subnegotiations are skipped whole;
/// unrecognized two-byte commands are skipped; a triplet truncated at the
/// chunk boundary is dropped.
pub(crate) fn refusal_reply(chunk: &[u8]) -> Vec<u8> {
    let mut reply = Vec::new();
    let mut idx = 0;
    while idx < chunk.len() {
        if chunk[idx] != IAC {
            idx += 1;
            continue;
        }
        match chunk.get(idx + 1) {
            Some(&SB) => {
                idx += 2;
                while idx < chunk.len() {
                    if chunk[idx] == IAC && chunk.get(idx + 1) == Some(&SE) {
                        idx += 2;
                        break;
                    }
                    idx += 1;
                }
            }
            Some(&verb) if matches!(verb, DO | DONT | WILL | WONT) => match chunk.get(idx + 2) {
                Some(&option) => {
                    if let Some(refusal) = refusal_verb(verb) {
                        reply.extend_from_slice(&[IAC, refusal, option]);
                    }
                    idx += 3;
                }
                None => break,
            },
            Some(_) => idx += 2,
            None => break,
        }
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPT_ECHO: u8 = 1;
    const OPT_SGA: u8 = 3;
    const OPT_TTYPE: u8 = 24;

    #[test]
    fn do_is_answered_with_wont() {
        assert_eq!(refusal_reply(&[IAC, DO, OPT_ECHO]), vec![IAC, WONT, OPT_ECHO]);
    }

    #[test]
    fn will_is_answered_with_do() {
        assert_eq!(refusal_reply(&[IAC, WILL, OPT_SGA]), vec![IAC, DO, OPT_SGA]);
    }

    #[test]
    fn acknowledgments_are_ignored() {
        assert!(refusal_reply(&[IAC, DONT, OPT_ECHO, IAC, WONT, OPT_SGA]).is_empty());
    }

    #[test]
    fn every_triplet_in_a_chunk_is_answered() {
        let chunk = [IAC, DO, OPT_ECHO, IAC, DO, OPT_SGA, IAC, WILL, OPT_ECHO];
        let reply = refusal_reply(&chunk);
        assert_eq!(
            reply,
            vec![IAC, WONT, OPT_ECHO, IAC, WONT, OPT_SGA, IAC, DO, OPT_ECHO]
        );
    }

    #[test]
    fn subnegotiation_is_skipped_whole() {
        let chunk = [IAC, SB, OPT_TTYPE, 1, IAC, SE, IAC, DO, OPT_ECHO];
        assert_eq!(refusal_reply(&chunk), vec![IAC, WONT, OPT_ECHO]);
    }

    #[test]
    fn truncated_triplet_produces_no_reply() {
        assert!(refusal_reply(&[IAC, DO]).is_empty());
        assert!(refusal_reply(&[IAC]).is_empty());
    }

    #[test]
    fn negotiation_detection_requires_leading_iac() {
        assert!(is_negotiation(&[IAC, DO, OPT_ECHO]));
        assert!(!is_negotiation(&[IAC, IAC, b'A']));
        assert!(!is_negotiation(b"login: "));
        assert!(!is_negotiation(&[]));
    }
}
