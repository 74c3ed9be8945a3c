//! Receiver: parser, handler, and poll driver wired to one session.
//!
//! [`Receiver`] is the single-threaded front door. For the two-context
//! deployment (bytes arriving from an interrupt or a reader task while a
//! main loop polls), [`Receiver::split`] hands out the [`Reception`] half and
//! the [`PollDriver`] half, which share the session through an `Arc`.

use std::sync::Arc;

use crate::codec::FrameParser;
use crate::core::{Clock, ConfigError, Indicator, ProtocolConfig, StorageSink, Transport, TransportResult};

use super::handler::{Disposition, MessageHandler};
use super::poll::{Outbound, PollDriver};
use super::state::{Session, SessionState, SessionStats};

/// Reception half: bytes in, decisions out.
#[derive(Debug)]
pub struct Reception<S> {
    parser: FrameParser,
    handler: MessageHandler<S>,
}

impl<S: StorageSink> Reception<S> {
    /// Create the reception half for a session.
    pub fn new(session: Arc<Session>, storage: S) -> Self {
        Self {
            parser: FrameParser::new(session.config()),
            handler: MessageHandler::new(session, storage),
        }
    }

    /// Feed one byte. Returns the handler's decision when the byte completes a frame.
    pub fn push_byte(&mut self, byte: u8) -> Option<Disposition> {
        let frame = self.parser.push(byte)?;
        Some(self.handler.handle(&frame))
    }

    /// Feed a run of bytes.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Disposition> {
        bytes
            .iter()
            .filter_map(|&byte| self.push_byte(byte))
            .collect()
    }

    /// Frame parser.
    pub fn parser(&self) -> &FrameParser {
        &self.parser
    }

    /// Message handler.
    pub fn handler(&self) -> &MessageHandler<S> {
        &self.handler
    }

    /// Mutable message handler.
    pub fn handler_mut(&mut self) -> &mut MessageHandler<S> {
        &mut self.handler
    }

    /// Consume the half, returning the storage sink.
    pub fn into_storage(self) -> S {
        self.handler.into_storage()
    }
}

/// A complete receiver.
#[derive(Debug)]
pub struct Receiver<S, C> {
    session: Arc<Session>,
    reception: Reception<S>,
    poller: PollDriver<C>,
}

impl<S: StorageSink, C: Clock> Receiver<S, C> {
    /// Create a receiver. The request period starts counting now.
    pub fn new(
        config: ProtocolConfig,
        storage: S,
        indicator: impl Indicator + 'static,
        clock: C,
    ) -> Result<Self, ConfigError> {
        let session = Arc::new(Session::new(config, Box::new(indicator), clock.now())?);
        Ok(Self {
            reception: Reception::new(Arc::clone(&session), storage),
            poller: PollDriver::new(Arc::clone(&session), clock),
            session,
        })
    }

    /// Shared session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Feed one received byte.
    pub fn on_byte(&mut self, byte: u8) -> Option<Disposition> {
        self.reception.push_byte(byte)
    }

    /// Feed a run of received bytes.
    pub fn on_bytes(&mut self, bytes: &[u8]) -> Vec<Disposition> {
        self.reception.push_bytes(bytes)
    }

    /// Run one poll cycle against `transport`.
    pub fn poll<T: Transport>(&mut self, transport: &mut T) -> Vec<Outbound> {
        self.poller.poll(transport)
    }

    /// Send the opening REQUEST.
    pub fn start<T: Transport>(&mut self, transport: &mut T) -> TransportResult<()> {
        self.poller.start(transport)
    }

    /// Send END to the remote.
    pub fn send_end<T: Transport>(&mut self, transport: &mut T) -> TransportResult<()> {
        self.poller.send_end(transport)
    }

    /// Enter or leave idle mode.
    pub fn set_idle(&self, idle: bool) {
        self.session.set_idle(idle)
    }

    /// Whether the session is idle.
    pub fn is_idle(&self) -> bool {
        self.session.is_idle()
    }

    /// Next sequence accepted as new data.
    pub fn expected_sequence(&self) -> u16 {
        self.session.expected_sequence()
    }

    /// Consistent copy of the session record.
    pub fn state(&self) -> SessionState {
        self.session.snapshot()
    }

    /// Session counters.
    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    /// Storage sink.
    pub fn storage(&self) -> &S {
        self.reception.handler().storage()
    }

    /// Return to sequence 0, active, parser at marker search.
    pub fn reset(&mut self) {
        self.reception.parser.reset();
        self.session.reset(self.poller.now());
    }

    /// Separate the reception and polling halves.
    pub fn split(self) -> (Reception<S>, PollDriver<C>) {
        (self.reception, self.poller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AckStatus, Frame, FrameEncoder, FrameType};
    use crate::core::ManualClock;
    use crate::session::PendingAck;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    type TestReceiver = Receiver<Vec<Vec<u8>>, ManualClock>;

    fn receiver() -> (TestReceiver, ManualClock, Arc<AtomicBool>) {
        let clock = ManualClock::new();
        let led = Arc::new(AtomicBool::new(false));
        let receiver = Receiver::new(
            ProtocolConfig::default(),
            Vec::new(),
            Arc::clone(&led),
            clock.clone(),
        )
        .unwrap();
        (receiver, clock, led)
    }

    fn data_frame(sequence: u16) -> Frame {
        let mut payload = vec![0xC3];
        payload.extend(std::iter::repeat_n(0u8, 400));
        FrameEncoder::default()
            .seal(FrameType::Data, sequence, payload)
            .unwrap()
    }

    fn wire(frame: &Frame) -> Vec<u8> {
        FrameEncoder::default().encode(frame).to_bytes()
    }

    fn outbound(bytes: &[u8]) -> Vec<Frame> {
        FrameParser::default().feed(bytes)
    }

    fn is_ack(frame: &Frame, status: AckStatus, sequence: u16) -> bool {
        frame.ack_status() == Some(status) && frame.sequence == sequence
    }

    fn is_request(frame: &Frame, sequence: u16) -> bool {
        frame.frame_type() == Some(FrameType::RequestData) && frame.sequence == sequence
    }

    #[test]
    fn test_accept_acks_and_requests_next() {
        let (mut receiver, _clock, _led) = receiver();

        let dispositions = receiver.on_bytes(&wire(&data_frame(0)));
        assert_eq!(
            dispositions,
            vec![Disposition::Accepted {
                sequence: 0,
                label: 0xC3
            }]
        );
        assert_eq!(receiver.storage().len(), 1);
        assert_eq!(receiver.storage()[0], vec![0u8; 400]);

        let mut link: Vec<u8> = Vec::new();
        receiver.poll(&mut link);
        let frames = outbound(&link);
        assert_eq!(frames.len(), 2);
        assert!(is_ack(&frames[0], AckStatus::Ok, 0));
        // No waiting for the request period.
        assert!(is_request(&frames[1], 1));
        assert_eq!(receiver.expected_sequence(), 1);
    }

    #[test]
    fn test_corrupt_frame_nacked_not_stored() {
        let (mut receiver, _clock, _led) = receiver();
        let mut bytes = wire(&data_frame(0));
        bytes[7 + 200] ^= 0x01;

        assert_eq!(
            receiver.on_bytes(&bytes),
            vec![Disposition::Corrupt { sequence: 0 }]
        );

        let mut link: Vec<u8> = Vec::new();
        receiver.poll(&mut link);
        let frames = outbound(&link);
        assert_eq!(frames.len(), 1);
        assert!(is_ack(&frames[0], AckStatus::Error, 0));
        assert!(receiver.storage().is_empty());
        assert_eq!(receiver.expected_sequence(), 0);
    }

    #[test]
    fn test_duplicate_reacked_not_stored() {
        let (mut receiver, _clock, _led) = receiver();
        let bytes = wire(&data_frame(0));
        let mut link: Vec<u8> = Vec::new();

        receiver.on_bytes(&bytes);
        receiver.poll(&mut link);
        assert_eq!(receiver.expected_sequence(), 1);

        link.clear();
        assert_eq!(
            receiver.on_bytes(&bytes),
            vec![Disposition::Duplicate { sequence: 0 }]
        );
        receiver.poll(&mut link);
        let frames = outbound(&link);
        assert_eq!(frames.len(), 1);
        assert!(is_ack(&frames[0], AckStatus::Ok, 0));
        assert_eq!(receiver.storage().len(), 1);
        assert_eq!(receiver.expected_sequence(), 1);
    }

    #[test]
    fn test_finish_goes_idle_and_silences_poll() {
        let (mut receiver, clock, led) = receiver();
        let finish = FrameEncoder::default()
            .seal(FrameType::Finish, 0, Vec::<u8>::new())
            .unwrap();

        assert_eq!(
            receiver.on_bytes(&wire(&finish)),
            vec![Disposition::Finished]
        );
        assert!(receiver.is_idle());
        assert!(led.load(Ordering::Acquire));

        let mut link: Vec<u8> = Vec::new();
        for _ in 0..10 {
            clock.advance(50);
            assert!(receiver.poll(&mut link).is_empty());
        }
        assert!(link.is_empty());
    }

    #[test]
    fn test_idle_gates_pending_decision() {
        let (mut receiver, clock, _led) = receiver();
        receiver.on_bytes(&wire(&data_frame(0)));
        assert_eq!(receiver.state().pending_ack, Some(PendingAck::ok(0)));

        receiver.set_idle(true);
        clock.advance(100);
        let mut link: Vec<u8> = Vec::new();
        assert!(receiver.poll(&mut link).is_empty());
        assert!(link.is_empty());
        assert_eq!(receiver.expected_sequence(), 0);
    }

    #[test]
    fn test_periodic_request_until_data() {
        let (mut receiver, clock, _led) = receiver();
        let mut link: Vec<u8> = Vec::new();
        receiver.start(&mut link).unwrap();

        for _ in 0..3 {
            clock.advance(20);
            receiver.poll(&mut link);
        }
        let frames = outbound(&link);
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| is_request(f, 0)));
        assert_eq!(receiver.stats().requests_sent, 4);
    }

    #[test]
    fn test_gap_then_recovery() {
        let (mut receiver, _clock, _led) = receiver();
        let mut link: Vec<u8> = Vec::new();

        receiver.on_bytes(&wire(&data_frame(2)));
        receiver.poll(&mut link);
        assert!(is_ack(&outbound(&link)[0], AckStatus::Error, 2));

        link.clear();
        receiver.on_bytes(&wire(&data_frame(0)));
        receiver.poll(&mut link);
        assert_eq!(receiver.expected_sequence(), 1);
        assert_eq!(receiver.storage().len(), 1);
    }

    #[test]
    fn test_end_after_finish() {
        let (mut receiver, _clock, _led) = receiver();
        let mut link: Vec<u8> = Vec::new();
        receiver.on_bytes(&wire(&data_frame(0)));
        receiver.poll(&mut link);
        receiver.set_idle(true);

        link.clear();
        receiver.send_end(&mut link).unwrap();
        let frames = outbound(&link);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type(), Some(FrameType::End));
        assert_eq!(frames[0].sequence, 1);
    }

    #[test]
    fn test_reset() {
        let (mut receiver, clock, led) = receiver();
        let mut link: Vec<u8> = Vec::new();
        receiver.on_bytes(&wire(&data_frame(0)));
        receiver.poll(&mut link);
        receiver.on_bytes(&wire(&data_frame(1))[..30]);
        receiver.set_idle(true);

        clock.advance(3);
        receiver.reset();
        assert_eq!(receiver.state(), SessionState::new(3));
        assert!(!led.load(Ordering::Acquire));

        // The half-received frame was abandoned.
        assert_eq!(receiver.on_bytes(&wire(&data_frame(0))).len(), 1);
        assert_eq!(receiver.storage().len(), 2);
    }

    #[test]
    fn test_split_halves_share_session() {
        let (receiver, _clock, _led) = receiver();
        let (mut reception, mut poller) = receiver.split();

        reception.push_bytes(&wire(&data_frame(0)));
        let mut link: Vec<u8> = Vec::new();
        poller.poll(&mut link);

        assert_eq!(poller.session().expected_sequence(), 1);
        assert_eq!(reception.into_storage().len(), 1);
    }

    #[test]
    fn test_split_across_threads() {
        let (receiver, _clock, _led) = receiver();
        let (mut reception, mut poller) = receiver.split();
        let session = Arc::clone(poller.session());

        let bytes: Vec<u8> = (0..20).flat_map(|seq| wire(&data_frame(seq))).collect();
        let reader = std::thread::spawn(move || {
            reception.push_bytes(&bytes);
            reception
        });

        let mut link: Vec<u8> = Vec::new();
        while !reader.is_finished() {
            poller.poll(&mut link);
        }
        let reception = reader.join().unwrap();
        poller.poll(&mut link);

        // Frames ahead of the expected sequence were NACKed; whatever was
        // stored was stored in order, once.
        let stored = reception.handler().storage().len() as u16;
        assert_eq!(session.expected_sequence(), stored);
        assert!(stored >= 1);
    }

    proptest! {
        #[test]
        fn prop_expected_sequence_monotonic(
            deliveries in proptest::collection::vec((0u16..6, any::<bool>(), any::<bool>()), 1..60),
        ) {
            let (mut receiver, clock, _led) = receiver();
            let mut link: Vec<u8> = Vec::new();

            for (sequence, corrupt, poll) in deliveries {
                let mut bytes = wire(&data_frame(sequence));
                if corrupt {
                    bytes[10] ^= 0x40;
                }
                receiver.on_bytes(&bytes);

                if poll {
                    let before = receiver.state();
                    clock.advance(1);
                    let sent = receiver.poll(&mut link);
                    let after = receiver.expected_sequence();

                    let advanced = before.pending_ack == Some(PendingAck::ok(before.expected_sequence));
                    if advanced {
                        prop_assert_eq!(after, before.expected_sequence + 1);
                        prop_assert!(sent.contains(&Outbound::Ack(PendingAck::ok(before.expected_sequence))));
                    } else {
                        prop_assert_eq!(after, before.expected_sequence);
                    }
                }
                prop_assert_eq!(
                    receiver.storage().len() as u16,
                    receiver.expected_sequence()
                        + u16::from(receiver.state().pending_ack == Some(PendingAck::ok(receiver.expected_sequence())))
                );
            }
        }

        #[test]
        fn prop_duplicates_never_stored(repeats in 1usize..10) {
            let (mut receiver, _clock, _led) = receiver();
            let mut link: Vec<u8> = Vec::new();
            receiver.on_bytes(&wire(&data_frame(0)));
            receiver.poll(&mut link);
            receiver.on_bytes(&wire(&data_frame(1)));
            receiver.poll(&mut link);

            for _ in 0..repeats {
                link.clear();
                prop_assert_eq!(
                    receiver.on_bytes(&wire(&data_frame(0))),
                    vec![Disposition::Duplicate { sequence: 0 }]
                );
                receiver.poll(&mut link);
                let frames = outbound(&link);
                prop_assert!(is_ack(&frames[0], AckStatus::Ok, 0));
            }
            prop_assert_eq!(receiver.storage().len(), 2);
            prop_assert_eq!(receiver.expected_sequence(), 2);
        }
    }
}
