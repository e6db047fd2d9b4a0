// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Message channels between the host and content frames.
//!
//! Each rendered position owns one [`Channel`]: its frame element, a random
//! per-session [`Guid`], and the origin messages to it are addressed to. The
//! [`ChannelRegistry`] owns every channel of one engine plus the single
//! host-wide inbound listener, which is attached when the first channel opens
//! and detached when the last one closes.
//!
//! # Inbound validation
//!
//! An inbound payload is dispatched only if all of the following hold:
//!
//! 1. it decodes to a [`Message`] with `pos`, `cmd`, and `guid`;
//! 2. a channel is open for `pos`;
//! 3. `guid` equals that channel's GUID;
//! 4. the sending window is the channel's frame window;
//! 5. `cmd` is a known verb.
//!
//! Anything else is a [`Delivery::Dropped`] with a [`DropReason`]. Drops are
//! silent toward the host page; the engine only traces them.
//!
//! # Transport
//!
//! Native messaging is used only after a self-addressed probe carrying a
//! private token has come back through the inbound listener. Until then, or
//! if the platform does not claim native messaging at all, outbound messages
//! go through the proxy transport.

use std::collections::BTreeMap;
use std::fmt;

use crate::platform::Host;
use crate::wire::{self, Message, Record};

/// Key carrying the native messaging probe token.
pub const PROBE_KEY: &str = "sf_probe";

/// A per-session channel token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Guid(String);

impl Guid {
    /// Generates a 128-bit token from the system random source.
    ///
    /// If the random source is unavailable, a token is derived from
    /// `fallback_seed` instead; such tokens are unique but predictable.
    #[must_use]
    pub fn generate(fallback_seed: u64) -> Self {
        let mut bytes = [0_u8; 16];
        if getrandom::fill(&mut bytes).is_err() {
            // splitmix64
            let mut state = fallback_seed ^ 0x5DEE_CE66_D1CE_4E5B;
            for chunk in bytes.chunks_mut(8) {
                state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
                let mut z = state;
                z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
                z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
                z ^= z >> 31;
                chunk.copy_from_slice(&z.to_le_bytes());
            }
        }
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// The token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only a prefix, so traces do not leak the token.
        write!(f, "Guid({}…)", self.0.get(..6).unwrap_or(&self.0))
    }
}

/// How outbound messages reach a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    /// `postMessage` style native messaging.
    Native,
    /// Relay through a proxy frame.
    Proxy,
}

/// Native messaging availability for the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NativeMessaging {
    /// No channel has been opened yet.
    #[default]
    Unknown,
    /// The probe is in flight.
    Probing,
    /// The probe came back.
    Available,
    /// The platform does not support it or the probe could not be sent.
    Unavailable,
}

/// Why an inbound payload was not dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Missing `pos`, `cmd`, or `guid`.
    Malformed,
    /// No channel is open for `pos`.
    UnknownPosition,
    /// `guid` does not match.
    GuidMismatch,
    /// The sender is not the channel's frame.
    WrongSender,
    /// `cmd` is not a known verb.
    UnknownCommand,
}

impl DropReason {
    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnknownPosition => "unknown-position",
            Self::GuidMismatch => "guid-mismatch",
            Self::WrongSender => "wrong-sender",
            Self::UnknownCommand => "unknown-command",
        }
    }
}

/// Result of [`ChannelRegistry::receive`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// A valid message for an open channel.
    Accepted(Message),
    /// Dropped without dispatch.
    Dropped {
        /// Why.
        reason: DropReason,
        /// Claimed position id, empty if absent.
        position: String,
        /// Claimed verb, empty if absent.
        verb: String,
    },
    /// The native messaging probe came back.
    Probe,
}

/// Outcome of [`ChannelRegistry::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sent {
    /// Transport used.
    pub transport: Transport,
    /// Whether the host reports the message as dispatched.
    pub dispatched: bool,
}

/// One position's channel.
#[derive(Clone, Debug)]
pub struct Channel<E> {
    position: String,
    frame: E,
    guid: Guid,
    target_origin: String,
}

impl<E> Channel<E> {
    /// Position id.
    #[must_use]
    pub fn position(&self) -> &str {
        &self.position
    }

    /// The frame element.
    #[must_use]
    pub fn frame(&self) -> &E {
        &self.frame
    }

    /// Session token.
    #[must_use]
    pub fn guid(&self) -> &Guid {
        &self.guid
    }

    /// Origin outbound messages are addressed to (`*` when unknown).
    #[must_use]
    pub fn target_origin(&self) -> &str {
        &self.target_origin
    }
}

/// All channels of one engine.
#[derive(Debug)]
pub struct ChannelRegistry<E> {
    channels: BTreeMap<String, Channel<E>>,
    native: NativeMessaging,
    probe_token: Option<Guid>,
    listening: bool,
    opened: u64,
}

impl<E> Default for ChannelRegistry<E> {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
            native: NativeMessaging::Unknown,
            probe_token: None,
            listening: false,
            opened: 0,
        }
    }
}

impl<E: Clone + PartialEq> ChannelRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the GUID for the next channel.
    ///
    /// Callers that must embed the token before the frame exists take it
    /// here and pass it to [`open_with_guid`](Self::open_with_guid).
    pub fn next_guid(&mut self) -> Guid {
        self.opened += 1;
        Guid::generate(self.opened)
    }

    /// Opens (or reopens) the channel for `position` with a fresh GUID.
    ///
    /// Attaches the inbound listener and sends the native messaging probe if
    /// this is the first channel.
    pub fn open<H>(
        &mut self,
        host: &mut H,
        position: &str,
        frame: E,
        origin: Option<String>,
    ) -> &Channel<E>
    where
        H: Host<Element = E> + ?Sized,
    {
        let guid = self.next_guid();
        self.open_with_guid(host, position, frame, origin, guid)
    }

    /// Opens (or reopens) the channel for `position` with a given GUID.
    pub fn open_with_guid<H>(
        &mut self,
        host: &mut H,
        position: &str,
        frame: E,
        origin: Option<String>,
        guid: Guid,
    ) -> &Channel<E>
    where
        H: Host<Element = E> + ?Sized,
    {
        if !self.listening {
            host.set_message_listener(true);
            self.listening = true;
        }
        if self.native == NativeMessaging::Unknown {
            self.native = NativeMessaging::Unavailable;
            if host.capabilities().native_messaging {
                let token = Guid::generate(self.opened.wrapping_add(u64::MAX / 3));
                let probe = Record::new().with(PROBE_KEY, token.as_str()).encode();
                if host.post_to_self(&probe) {
                    self.native = NativeMessaging::Probing;
                    self.probe_token = Some(token);
                }
            }
        }
        let channel = Channel {
            position: position.to_owned(),
            frame,
            guid,
            target_origin: origin.unwrap_or_else(|| "*".to_owned()),
        };
        self.channels.insert(position.to_owned(), channel);
        &self.channels[position]
    }

    /// Closes the channel for `position`; returns whether one was open.
    ///
    /// Detaches the inbound listener when no channels remain.
    pub fn close<H>(&mut self, host: &mut H, position: &str) -> bool
    where
        H: Host<Element = E> + ?Sized,
    {
        let closed = self.channels.remove(position).is_some();
        if self.channels.is_empty() && self.listening {
            host.set_message_listener(false);
            self.listening = false;
        }
        closed
    }

    /// Closes every channel.
    pub fn close_all<H>(&mut self, host: &mut H)
    where
        H: Host<Element = E> + ?Sized,
    {
        self.channels.clear();
        if self.listening {
            host.set_message_listener(false);
            self.listening = false;
        }
    }

    /// The channel for `position`.
    #[must_use]
    pub fn get(&self, position: &str) -> Option<&Channel<E>> {
        self.channels.get(position)
    }

    /// Whether the inbound listener is attached.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Native messaging state.
    #[must_use]
    pub fn native_messaging(&self) -> NativeMessaging {
        self.native
    }

    /// The transport the next send will use.
    #[must_use]
    pub fn transport(&self) -> Transport {
        if self.native == NativeMessaging::Available {
            Transport::Native
        } else {
            Transport::Proxy
        }
    }

    /// Validates an inbound payload from window `source`.
    pub fn receive<H>(&mut self, host: &H, payload: &str, source: Option<&H::Window>) -> Delivery
    where
        H: Host<Element = E> + ?Sized,
    {
        let record = Record::decode(payload);
        if let (Some(token), Some(echo)) = (&self.probe_token, record.get(PROBE_KEY)) {
            if token.as_str() == echo {
                self.native = NativeMessaging::Available;
                self.probe_token = None;
                return Delivery::Probe;
            }
        }

        let dropped = |reason, record: &Record| Delivery::Dropped {
            reason,
            position: record.get(wire::KEY_POS).unwrap_or_default().to_owned(),
            verb: record.get(wire::KEY_CMD).unwrap_or_default().to_owned(),
        };
        let message = match Message::from_record(record.clone()) {
            Ok(message) => message,
            Err(_) => return dropped(DropReason::Malformed, &record),
        };
        let Some(channel) = self.channels.get(&message.pos) else {
            return dropped(DropReason::UnknownPosition, &record);
        };
        if channel.guid.as_str() != message.guid {
            return dropped(DropReason::GuidMismatch, &record);
        }
        let expected = host.frame_window(&channel.frame);
        if source.is_none() || expected.as_ref() != source {
            return dropped(DropReason::WrongSender, &record);
        }
        if message.command().is_none() {
            return dropped(DropReason::UnknownCommand, &record);
        }
        Delivery::Accepted(message)
    }

    /// Sends `record` to `position`'s frame, adding `pos` and `guid`.
    ///
    /// Returns `None` if no channel is open for `position`.
    pub fn send<H>(
        &mut self,
        host: &mut H,
        position: &str,
        mut record: Record,
        proxy_url: Option<&str>,
    ) -> Option<Sent>
    where
        H: Host<Element = E> + ?Sized,
    {
        let transport = self.transport();
        let channel = self.channels.get(position)?;
        record.insert(wire::KEY_POS, position);
        record.insert(wire::KEY_GUID, channel.guid.as_str());
        let payload = record.encode();
        let dispatched = match transport {
            Transport::Native => host.post_message(&channel.frame, &payload, &channel.target_origin),
            Transport::Proxy => {
                proxy_url.is_some_and(|url| host.proxy_send(&channel.frame, url, &payload))
            }
        };
        Some(Sent {
            transport,
            dispatched,
        })
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{Rect, Size};

    use super::*;
    use crate::platform::PlatformCapabilities;
    use crate::sim::SimHost;

    fn setup() -> (SimHost, <SimHost as Host>::Element) {
        let mut host = SimHost::new(Size::new(1000.0, 800.0));
        let root = host.root();
        let frame = host.add_frame(root, Rect::new(0.0, 0.0, 300.0, 250.0));
        (host, frame)
    }

    fn deliver_probe(
        registry: &mut ChannelRegistry<<SimHost as Host>::Element>,
        host: &mut SimHost,
    ) {
        for payload in host.take_self_posts() {
            assert_eq!(registry.receive(&*host, &payload, None), Delivery::Probe);
        }
    }

    #[test]
    fn guids_are_distinct_hex() {
        let a = Guid::generate(1);
        let b = Guid::generate(1);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert!(!format!("{a:?}").contains(a.as_str()), "debug output is redacted");
    }

    #[test]
    fn listener_follows_channel_count() {
        let (mut host, frame) = setup();
        let mut registry = ChannelRegistry::new();
        registry.open(&mut host, "p1", frame, None);
        registry.open(&mut host, "p2", frame, None);
        assert!(host.message_listener());
        assert!(registry.close(&mut host, "p1"));
        assert!(host.message_listener(), "still one channel open");
        registry.close(&mut host, "p2");
        assert!(!host.message_listener());
        assert!(!registry.close(&mut host, "p2"));
    }

    #[test]
    fn probe_enables_native_transport() {
        let (mut host, frame) = setup();
        let mut registry = ChannelRegistry::new();
        registry.open(&mut host, "p1", frame, Some("https://frames.example".into()));
        assert_eq!(registry.native_messaging(), NativeMessaging::Probing);

        let sent = registry
            .send(&mut host, "p1", Record::new().with("cmd", "msg"), None)
            .unwrap();
        assert_eq!(sent.transport, Transport::Proxy);
        assert!(!sent.dispatched, "no proxy configured");

        deliver_probe(&mut registry, &mut host);
        assert_eq!(registry.native_messaging(), NativeMessaging::Available);
        let sent = registry
            .send(&mut host, "p1", Record::new().with("cmd", "msg"), None)
            .unwrap();
        assert_eq!(sent.transport, Transport::Native);
        assert!(sent.dispatched);

        let posted = host.take_posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].target_origin, "https://frames.example");
        let record = Record::decode(&posted[0].payload);
        assert_eq!(record.get("pos"), Some("p1"));
        assert_eq!(
            record.get("guid"),
            registry.get("p1").map(|c| c.guid().as_str())
        );
    }

    #[test]
    fn no_native_claim_means_no_probe() {
        let (mut host, frame) = setup();
        host.set_capabilities(PlatformCapabilities {
            native_messaging: false,
            ..PlatformCapabilities::default()
        });
        let mut registry = ChannelRegistry::new();
        registry.open(&mut host, "p1", frame, None);
        assert_eq!(registry.native_messaging(), NativeMessaging::Unavailable);
        assert!(host.take_self_posts().is_empty());
        let sent = registry
            .send(&mut host, "p1", Record::new(), Some("https://host.example/msg.html"))
            .unwrap();
        assert_eq!(sent.transport, Transport::Proxy);
        assert!(sent.dispatched);
        assert_eq!(host.take_proxied().len(), 1);
    }

    #[test]
    fn receive_validates_guid_and_sender() {
        let (mut host, frame) = setup();
        let root = host.root();
        let other = host.add_frame(root, Rect::new(0.0, 300.0, 300.0, 550.0));
        let mut registry = ChannelRegistry::new();
        let guid = registry.open(&mut host, "p1", frame, None).guid().clone();
        let window = host.frame_window(&frame);
        let stranger = host.frame_window(&other);

        let good = format!("pos=p1&cmd=collapse&guid={}", guid.as_str());
        assert!(matches!(
            registry.receive(&host, &good, window.as_ref()),
            Delivery::Accepted(_)
        ));

        let drop_reason = |delivery| match delivery {
            Delivery::Dropped { reason, .. } => Some(reason),
            _ => None,
        };
        assert_eq!(
            drop_reason(registry.receive(&host, "pos=p1&cmd=collapse&guid=nope", window.as_ref())),
            Some(DropReason::GuidMismatch)
        );
        assert_eq!(
            drop_reason(registry.receive(&host, &good, stranger.as_ref())),
            Some(DropReason::WrongSender)
        );
        assert_eq!(
            drop_reason(registry.receive(&host, &good, None)),
            Some(DropReason::WrongSender)
        );
        assert_eq!(
            drop_reason(registry.receive(&host, "cmd=collapse", window.as_ref())),
            Some(DropReason::Malformed)
        );
        let unknown = format!("pos=p2&cmd=collapse&guid={}", guid.as_str());
        assert_eq!(
            drop_reason(registry.receive(&host, &unknown, window.as_ref())),
            Some(DropReason::UnknownPosition)
        );
        let bogus = format!("pos=p1&cmd=detonate&guid={}", guid.as_str());
        assert_eq!(
            drop_reason(registry.receive(&host, &bogus, window.as_ref())),
            Some(DropReason::UnknownCommand)
        );
    }

    #[test]
    fn reopen_rotates_guid() {
        let (mut host, frame) = setup();
        let mut registry = ChannelRegistry::new();
        let first = registry.open(&mut host, "p1", frame, None).guid().clone();
        let second = registry.open(&mut host, "p1", frame, None).guid().clone();
        assert_ne!(first, second);
    }
}
