//! Where tag reads come from
//!
//! A trigger source yields batches of tags to report from every reader. The
//! operator drives an [`InteractiveTrigger`] by picking participants from the
//! roster; a [`GeneratorTrigger`] emits synthetic tags on a fixed interval.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rfid_protocol::{TagValue, TAG_ID_LEN};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::roster::{Roster, RosterEntry};

/// Producer of tag batches
pub trait TriggerSource {
    /// Wait for the next batch; `None` once the source is finished
    fn next_batch(&mut self) -> impl Future<Output = Option<Vec<String>>> + Send;
}

/// One operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Up,
    Down,
    Confirm,
    Reset,
    Quit,
}

impl KeyAction {
    /// Parse one line of operator input
    ///
    /// Matching ignores case and surrounding whitespace. An empty line is a
    /// confirm, so pressing enter sends the highlighted participant.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" | "enter" | "send" => Some(KeyAction::Confirm),
            "k" | "w" | "up" => Some(KeyAction::Up),
            "j" | "s" | "down" => Some(KeyAction::Down),
            "r" | "reset" => Some(KeyAction::Reset),
            "q" | "quit" | "exit" | "esc" => Some(KeyAction::Quit),
            _ => None,
        }
    }
}

/// Cursor over the roster with per-entry sent flags
#[derive(Debug, Clone)]
pub struct Selector {
    roster: Roster,
    highlighted: usize,
    sent: Vec<bool>,
    track_sent: bool,
    quit: bool,
}

impl Selector {
    /// Selector that remembers which participants were sent
    pub fn new(roster: Roster) -> Self {
        let sent = vec![false; roster.len()];
        Self {
            roster,
            highlighted: 0,
            sent,
            track_sent: true,
            quit: false,
        }
    }

    /// Plain single-select variant without sent tracking
    pub fn without_sent_tracking(roster: Roster) -> Self {
        Self {
            track_sent: false,
            ..Self::new(roster)
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Index of the highlighted entry; meaningless for an empty roster
    pub fn highlighted(&self) -> usize {
        self.highlighted
    }

    pub fn highlighted_entry(&self) -> Option<&RosterEntry> {
        self.roster.get(self.highlighted)
    }

    pub fn is_sent(&self, index: usize) -> bool {
        self.sent.get(index).copied().unwrap_or(false)
    }

    pub fn tracks_sent(&self) -> bool {
        self.track_sent
    }

    pub fn is_quit(&self) -> bool {
        self.quit
    }

    /// Apply one action and return the tag to send, if any
    ///
    /// Nothing happens once the selector has quit.
    pub fn apply(&mut self, action: KeyAction) -> Option<String> {
        if self.quit {
            return None;
        }

        match action {
            KeyAction::Up => {
                self.highlighted = self.highlighted.saturating_sub(1);
                None
            }
            KeyAction::Down => {
                if self.highlighted + 1 < self.roster.len() {
                    self.highlighted += 1;
                }
                None
            }
            KeyAction::Confirm => {
                let tag = self.highlighted_entry()?.tag_id.clone();
                if self.track_sent {
                    self.sent[self.highlighted] = true;
                }
                Some(tag)
            }
            KeyAction::Reset => {
                self.sent.iter_mut().for_each(|s| *s = false);
                None
            }
            KeyAction::Quit => {
                self.quit = true;
                None
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.roster.is_empty() {
            return writeln!(f, "  (no participants with tags)");
        }
        for (i, entry) in self.roster.entries().iter().enumerate() {
            let cursor = if i == self.highlighted { '>' } else { ' ' };
            let mark = if self.is_sent(i) { " *" } else { "" };
            writeln!(f, "{} {}{}", cursor, entry.label(), mark)?;
        }
        Ok(())
    }
}

/// Callback invoked with the selector after every state change
pub type Renderer = Box<dyn FnMut(&Selector) + Send>;

/// Operator-driven trigger reading command lines from a channel
pub struct InteractiveTrigger {
    selector: Selector,
    input: mpsc::Receiver<String>,
    renderer: Option<Renderer>,
}

impl InteractiveTrigger {
    pub fn new(selector: Selector, input: mpsc::Receiver<String>) -> Self {
        Self {
            selector,
            input,
            renderer: None,
        }
    }

    /// Redraw through `renderer` on every state change
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    fn render(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer(&self.selector);
        }
    }
}

impl fmt::Debug for InteractiveTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveTrigger")
            .field("selector", &self.selector)
            .field("has_renderer", &self.renderer.is_some())
            .finish()
    }
}

impl TriggerSource for InteractiveTrigger {
    async fn next_batch(&mut self) -> Option<Vec<String>> {
        self.render();
        while !self.selector.is_quit() {
            let Some(line) = self.input.recv().await else {
                debug!("Operator input closed");
                self.selector.apply(KeyAction::Quit);
                break;
            };

            let Some(action) = KeyAction::parse(&line) else {
                trace!("Ignoring operator input {:?}", line);
                continue;
            };

            let tag = self.selector.apply(action);
            self.render();
            if let Some(tag) = tag {
                return Some(vec![tag]);
            }
        }
        None
    }
}

/// Fixed trailing bytes of every generated tag
pub const GENERATED_TAG_SUFFIX: [u8; 3] = [0xC0, 0xFF, 0xEE];
/// Default pause between generated tags
pub const DEFAULT_GENERATOR_INTERVAL: Duration = Duration::from_millis(1000);

/// Synthetic tag sequence: discriminator, wrapping counter, fixed suffix
#[derive(Debug, Clone)]
pub struct TagGenerator {
    discriminator: u8,
    counter: u8,
}

impl TagGenerator {
    pub fn new(discriminator: u8) -> Self {
        Self {
            discriminator,
            counter: 0,
        }
    }

    /// Next tag in the sequence; the counter wraps after 255
    pub fn next_tag(&mut self) -> TagValue {
        let mut bytes = [0u8; TAG_ID_LEN];
        bytes[0] = self.discriminator;
        bytes[1] = self.counter;
        bytes[2..].copy_from_slice(&GENERATED_TAG_SUFFIX);
        self.counter = self.counter.wrapping_add(1);
        TagValue::new(bytes)
    }
}

/// Trigger that emits one generated tag per interval, forever
#[derive(Debug)]
pub struct GeneratorTrigger {
    generator: TagGenerator,
    ticker: Interval,
}

impl GeneratorTrigger {
    /// The first tag is emitted immediately, then one per `period`
    pub fn new(generator: TagGenerator, period: Duration) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { generator, ticker }
    }
}

impl TriggerSource for GeneratorTrigger {
    async fn next_batch(&mut self) -> Option<Vec<String>> {
        self.ticker.tick().await;
        Some(vec![self.generator.next_tag().to_hex()])
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn key_action() -> impl Strategy<Value = KeyAction> {
        prop_oneof![
            Just(KeyAction::Up),
            Just(KeyAction::Down),
            Just(KeyAction::Confirm),
            Just(KeyAction::Reset),
        ]
    }

    proptest! {
        #[test]
        fn generator_counter_wraps(discriminator: u8, skip in 0usize..1024) {
            let mut generator = TagGenerator::new(discriminator);
            for _ in 0..skip {
                generator.next_tag();
            }
            let tag = generator.next_tag();
            let bytes = tag.as_bytes();
            prop_assert_eq!(bytes[0], discriminator);
            prop_assert_eq!(bytes[1] as usize, skip % 256);
            prop_assert_eq!(&bytes[2..], &GENERATED_TAG_SUFFIX[..]);
        }

        #[test]
        fn selector_cursor_stays_in_roster(
            len in 1u32..12,
            actions in prop::collection::vec(key_action(), 0..64),
        ) {
            let mut selector = Selector::new(super::tests::roster(len));
            let mut confirmed = vec![false; len as usize];
            for action in actions {
                let sent = selector.apply(action);
                prop_assert!(selector.highlighted() < len as usize);
                match action {
                    KeyAction::Confirm => {
                        prop_assert!(sent.is_some());
                        confirmed[selector.highlighted()] = true;
                    }
                    KeyAction::Reset => confirmed.iter_mut().for_each(|c| *c = false),
                    _ => prop_assert!(sent.is_none()),
                }
            }
            for (index, expected) in confirmed.iter().enumerate() {
                prop_assert_eq!(selector.is_sent(index), *expected);
            }
        }
    }
}
