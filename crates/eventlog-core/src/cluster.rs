//! The two-frame tuple exchanged with cluster peers.

use bytes::Bytes;

/// An untyped two-frame tuple exchanged on the pub/sub bus: `(tag, payload)`
/// for the cluster channels, where `tag` is a [`ClusterTag`]'s bytes; or
/// `(frame0, frame1)` for `monitorMessageChan`, where `frame.0` is not a
/// recognized tag and the legacy-monitor worker only reads `frame.1`.
pub type TwoFrame = (Bytes, Bytes);

/// Tag of a cluster envelope frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterTag {
    EventMessage,
    ServiceMonitorMessage,
    ServiceNewMonitorMessage,
}

impl ClusterTag {
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::EventMessage => b"EventMessage",
            Self::ServiceMonitorMessage => b"ServiceMonitorMessage",
            Self::ServiceNewMonitorMessage => b"ServiceNewMonitorMessage",
        }
    }

    #[must_use]
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        match raw {
            b"EventMessage" => Some(Self::EventMessage),
            b"ServiceMonitorMessage" => Some(Self::ServiceMonitorMessage),
            b"ServiceNewMonitorMessage" => Some(Self::ServiceNewMonitorMessage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrips_through_bytes() {
        for tag in [
            ClusterTag::EventMessage,
            ClusterTag::ServiceMonitorMessage,
            ClusterTag::ServiceNewMonitorMessage,
        ] {
            assert_eq!(ClusterTag::from_bytes(tag.as_bytes()), Some(tag));
        }
    }

    #[test]
    fn unknown_tag_bytes_rejected() {
        assert_eq!(ClusterTag::from_bytes(b"bogus"), None);
    }
}
