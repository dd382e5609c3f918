// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

use crate::lighting::types::ChannelSet;

use super::effects::EffectKind;

/// Notifications about arbiter state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ArbiterEvent {
    ManualOverride { fixture: String, channels: ChannelSet },
    ManualRelease { fixture: String, channels: ChannelSet },
    Blackout { active: bool },
    OutputGate { enabled: bool },
    EffectStarted { id: u64, kind: EffectKind },
    EffectEnded { id: u64, kind: EffectKind },
}

/// Fans events out to every live subscriber. Subscribers that have dropped
/// their receiver are forgotten on the next send.
#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<ArbiterEvent>>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self) -> Receiver<ArbiterEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn emit(&mut self, event: ArbiterEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_and_drop() {
        let mut bus = EventBus::default();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.emit(ArbiterEvent::Blackout { active: true });
        assert_eq!(first.try_recv().unwrap(), ArbiterEvent::Blackout { active: true });
        assert_eq!(second.try_recv().unwrap(), ArbiterEvent::Blackout { active: true });

        drop(second);
        bus.emit(ArbiterEvent::OutputGate { enabled: true });
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(
            first.try_recv().unwrap(),
            ArbiterEvent::OutputGate { enabled: true }
        );
    }
}
