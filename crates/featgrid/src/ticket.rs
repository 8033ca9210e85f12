//! # Request Tickets
//!
//! A [`Ticket`] is the opaque token handed to the transport to start a
//! retrieval. It is the protobuf encoding of a single [`TicketMessage`] row
//! carrying the ordered ids and windows of a [`FeatureRequest`], tagged with
//! [`TICKET_VERSION`].
//!
//! Encoding is a pure function of its inputs: the same ids and windows always
//! produce the same bytes, and [`decode_ticket`] recovers them with identical
//! order and values.

use crate::proto::{TICKET_VERSION, TicketMessage, WindowMessage};
use crate::schema::check_unique_names;
use crate::{EncodingError, EntityId, FeatureRequest, FeatureWindow};
use bytes::{Buf, Bytes};
use prost::Message;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Opaque, encoded feature request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(Bytes);

impl Ticket {
    /// Wraps bytes received from elsewhere (e.g. on the serving side). No
    /// validation happens until [`Ticket::decode`].
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The encoded ticket.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the ticket and returns its buffer without copying.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the ticket has no bytes at all. An encoded empty request is
    /// not necessarily empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// # Errors
    ///
    /// See [`decode_ticket`].
    pub fn decode(&self) -> Result<FeatureRequest, EncodingError> {
        decode_ticket(self.0.clone())
    }
}

impl AsRef<[u8]> for Ticket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Ticket> for Bytes {
    fn from(ticket: Ticket) -> Self {
        ticket.0
    }
}

impl From<Ticket> for Vec<u8> {
    fn from(ticket: Ticket) -> Self {
        ticket.0.into()
    }
}

/// Encodes ids and windows into a ticket.
///
/// Ids may be empty or repeat; each occurrence is its own row in the response.
///
/// # Errors
///
/// Returns [`EncodingError::DuplicateWindow`] if two windows share a name.
/// Everything else was validated when the [`EntityId`]s and
/// [`FeatureWindow`]s were built.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(ids = ids.len(), windows = windows.len()))
)]
pub fn encode_ticket(ids: &[EntityId], windows: &[FeatureWindow]) -> Result<Ticket, EncodingError> {
    check_unique_names(windows)?;

    let message = TicketMessage {
        version: TICKET_VERSION,
        ids: ids.iter().map(|id| id.as_str().to_owned()).collect(),
        windows: windows
            .iter()
            .map(|w| WindowMessage {
                name: w.name().to_owned(),
                start: i32::from(w.start()),
                end: i32::from(w.end()),
            })
            .collect(),
    };
    let ticket = Ticket(Bytes::from(message.encode_to_vec()));

    #[cfg(feature = "tracing")]
    tracing::trace!(bytes = ticket.len(), "encoded ticket");

    Ok(ticket)
}

/// Validates loosely typed input and encodes it.
///
/// Windows are `(name, start, end)` tuples; bounds are range-checked into
/// `i16` here.
///
/// # Errors
///
/// Any [`EncodingError`] raised while building the [`EntityId`]s and
/// [`FeatureWindow`]s, or by [`encode_ticket`].
pub fn encode_raw_ticket<S, N>(ids: &[S], windows: &[(N, i32, i32)]) -> Result<Ticket, EncodingError>
where
    S: AsRef<str>,
    N: AsRef<str>,
{
    let ids = ids
        .iter()
        .map(|id| EntityId::new(id.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    let windows = windows
        .iter()
        .map(|(name, start, end)| {
            FeatureWindow::from_bounds(name.as_ref(), i64::from(*start), i64::from(*end))
        })
        .collect::<Result<Vec<_>, _>>()?;
    encode_ticket(&ids, &windows)
}

/// Decodes a ticket back into the request it was built from.
///
/// Decoding re-applies every schema rule, so a forged ticket cannot smuggle an
/// inverted or out-of-range window past the server.
///
/// # Errors
///
/// - [`EncodingError::Decode`] if the bytes are not a ticket message
/// - [`EncodingError::UnsupportedVersion`] on a version mismatch
/// - any schema violation in the carried ids or windows
pub fn decode_ticket(bytes: impl Buf) -> Result<FeatureRequest, EncodingError> {
    let message = TicketMessage::decode(bytes)?;
    if message.version != TICKET_VERSION {
        return Err(EncodingError::UnsupportedVersion {
            found: message.version,
            expected: TICKET_VERSION,
        });
    }

    let ids = message
        .ids
        .into_iter()
        .map(EntityId::new)
        .collect::<Result<Vec<_>, _>>()?;
    let windows = message
        .windows
        .into_iter()
        .map(|w| FeatureWindow::from_bounds(w.name, i64::from(w.start), i64::from(w.end)))
        .collect::<Result<Vec<_>, _>>()?;

    FeatureRequest::new(ids, windows)
}

impl FeatureRequest {
    /// # Errors
    ///
    /// See [`encode_ticket`].
    pub fn to_ticket(&self) -> Result<Ticket, EncodingError> {
        encode_ticket(self.ids(), self.windows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<EntityId> {
        raw.iter().map(|id| EntityId::new(*id).unwrap()).collect()
    }

    #[test]
    fn round_trip_preserves_order_and_values() {
        let ids = ids(&["user3", "user1", "user3", "user2"]);
        let windows = vec![
            FeatureWindow::default_series(2, 3).unwrap(),
            FeatureWindow::new("f1", 2, 8).unwrap(),
            FeatureWindow::new("f2", i16::MIN, i16::MAX).unwrap(),
            FeatureWindow::new("neg", -10, -1).unwrap(),
        ];

        let ticket = encode_ticket(&ids, &windows).unwrap();
        let decoded = ticket.decode().unwrap();

        assert_eq!(decoded.ids(), ids.as_slice());
        assert_eq!(decoded.windows(), windows.as_slice());
    }

    #[test]
    fn empty_request_is_a_valid_ticket() {
        let ticket = encode_ticket(&[], &[]).unwrap();
        let decoded = decode_ticket(ticket.as_bytes()).unwrap();
        assert_eq!(decoded.shape(), (0, 0));
    }

    #[test]
    fn encoding_is_deterministic() {
        let ids = ids(&["a", "b"]);
        let windows = vec![FeatureWindow::new("f", 1, 3).unwrap()];
        let first = encode_ticket(&ids, &windows).unwrap();
        let second = FeatureRequest::new(ids, windows)
            .unwrap()
            .to_ticket()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn raw_encoding_validates_bounds() {
        assert_eq!(
            encode_raw_ticket(&["a"], &[("f", 5, 2)]).unwrap_err(),
            EncodingError::InvertedWindow {
                name: "f".into(),
                start: 5,
                end: 2
            }
        );
        assert_eq!(
            encode_raw_ticket(&["a"], &[("f", 40000, 40001)]).unwrap_err(),
            EncodingError::BoundOutOfRange {
                name: "f".into(),
                value: 40000
            }
        );
        assert!(matches!(
            encode_raw_ticket(&[""], &[("f", 1, 2)]),
            Err(EncodingError::InvalidEntityId { .. })
        ));
        assert!(encode_raw_ticket(&["a"], &[("f", 1, 2), ("g", 1, 2)]).is_ok());
    }

    #[test]
    fn duplicate_window_names_are_rejected() {
        let windows = vec![
            FeatureWindow::new("f", 0, 1).unwrap(),
            FeatureWindow::new("f", 1, 2).unwrap(),
        ];
        assert_eq!(
            encode_ticket(&ids(&["a"]), &windows).unwrap_err(),
            EncodingError::DuplicateWindow { name: "f".into() }
        );
    }

    #[test]
    fn decode_rejects_other_versions() {
        let bytes = TicketMessage {
            version: 2,
            ids: vec!["a".into()],
            windows: vec![],
        }
        .encode_to_vec();
        assert_eq!(
            decode_ticket(bytes.as_slice()).unwrap_err(),
            EncodingError::UnsupportedVersion {
                found: 2,
                expected: TICKET_VERSION
            }
        );
    }

    #[test]
    fn decode_revalidates_forged_windows() {
        let bytes = TicketMessage {
            version: TICKET_VERSION,
            ids: vec!["a".into()],
            windows: vec![WindowMessage {
                name: "f".into(),
                start: 0,
                end: 40000,
            }],
        }
        .encode_to_vec();
        assert_eq!(
            decode_ticket(bytes.as_slice()).unwrap_err(),
            EncodingError::BoundOutOfRange {
                name: "f".into(),
                value: 40000
            }
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        let ticket = Ticket::from_bytes(vec![0xff, 0xff, 0xff]);
        assert!(matches!(
            ticket.decode(),
            Err(EncodingError::Decode { .. })
        ));
    }
}
