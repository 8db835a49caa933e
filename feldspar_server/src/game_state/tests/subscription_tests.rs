// Copyright 2023 drey7925
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{ensure, Result};
use async_trait::async_trait;
use feldspar_core::{
    chunk_square::ordered_chunk_square,
    coordinates::{ChunkCoordinate, ShardCoordinate},
};
use parking_lot::Mutex;
use proptest::prelude::*;
use rustc_hash::FxHashSet;

use crate::game_state::subscriptions::{ChunkSubscriptions, ShardConnector, ShardLink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkEvent {
    Connect(ShardCoordinate),
    Subscribe(ChunkCoordinate),
    Unsubscribe(ChunkCoordinate),
    Disconnect(ShardCoordinate),
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<LinkEvent>>>);
impl Recorder {
    fn take(&self) -> Vec<LinkEvent> {
        std::mem::take(&mut *self.0.lock())
    }
    fn push(&self, event: LinkEvent) {
        self.0.lock().push(event)
    }
}

struct FakeLink {
    shard: ShardCoordinate,
    recorder: Recorder,
}
#[async_trait]
impl ShardLink for FakeLink {
    async fn subscribe_chunk(&mut self, chunk: ChunkCoordinate) {
        assert_eq!(chunk.shard(), self.shard);
        self.recorder.push(LinkEvent::Subscribe(chunk));
    }
    async fn unsubscribe_chunk(&mut self, chunk: ChunkCoordinate) {
        assert_eq!(chunk.shard(), self.shard);
        self.recorder.push(LinkEvent::Unsubscribe(chunk));
    }
    async fn disconnect(&mut self) {
        self.recorder.push(LinkEvent::Disconnect(self.shard));
    }
}

type Unreachable = Arc<Mutex<FxHashSet<ShardCoordinate>>>;

struct FakeConnector {
    recorder: Recorder,
    unreachable: Unreachable,
}
impl ShardConnector for FakeConnector {
    type Link = FakeLink;

    fn connect(&self, shard: ShardCoordinate) -> Result<FakeLink> {
        ensure!(!self.unreachable.lock().contains(&shard), "{:?} is unreachable", shard);
        self.recorder.push(LinkEvent::Connect(shard));
        Ok(FakeLink {
            shard,
            recorder: self.recorder.clone(),
        })
    }
}

fn subscriptions(radius: i32) -> (ChunkSubscriptions<FakeConnector>, Recorder) {
    let (subs, recorder, _) = flaky_subscriptions(radius);
    (subs, recorder)
}

/// Like [subscriptions], but shards added to the returned set refuse connections.
fn flaky_subscriptions(radius: i32) -> (ChunkSubscriptions<FakeConnector>, Recorder, Unreachable) {
    let recorder = Recorder::default();
    let unreachable = Unreachable::default();
    let connector = FakeConnector {
        recorder: recorder.clone(),
        unreachable: unreachable.clone(),
    };
    (ChunkSubscriptions::new(connector, radius), recorder, unreachable)
}

fn subscribed(events: &[LinkEvent]) -> Vec<ChunkCoordinate> {
    events
        .iter()
        .filter_map(|e| match e {
            LinkEvent::Subscribe(c) => Some(*c),
            _ => None,
        })
        .collect()
}

fn unsubscribed(events: &[LinkEvent]) -> Vec<ChunkCoordinate> {
    events
        .iter()
        .filter_map(|e| match e {
            LinkEvent::Unsubscribe(c) => Some(*c),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn init_subscribes_nearest_first() {
    let (mut subs, recorder) = subscriptions(1);
    subs.init(ChunkCoordinate::new(0, 0)).await.unwrap();
    let events = recorder.take();
    assert_eq!(
        subscribed(&events),
        ordered_chunk_square(ChunkCoordinate::new(0, 0), 1)
    );
    assert_eq!(subscribed(&events)[0], ChunkCoordinate::new(0, 0));
    // The window straddles the corner of four shards
    assert_eq!(subs.shard_count(), 4);
    assert_eq!(subs.subscription_count(ShardCoordinate::new(0, 0)), 4);
    assert_eq!(subs.subscription_count(ShardCoordinate::new(-1, 0)), 2);
    assert_eq!(subs.subscription_count(ShardCoordinate::new(0, -1)), 2);
    assert_eq!(subs.subscription_count(ShardCoordinate::new(-1, -1)), 1);
    assert_eq!(subs.current_shard(), Some(ShardCoordinate::new(0, 0)));
}

#[tokio::test]
async fn moving_within_a_chunk_is_free() {
    let (mut subs, recorder) = subscriptions(2);
    subs.init(ChunkCoordinate::new(5, 5)).await.unwrap();
    recorder.take();
    assert!(!subs.move_to(ChunkCoordinate::new(5, 5)).await.unwrap());
    assert!(recorder.take().is_empty());
}

#[tokio::test]
async fn moving_one_chunk_trades_an_edge() {
    let (mut subs, recorder) = subscriptions(2);
    subs.init(ChunkCoordinate::new(5, 5)).await.unwrap();
    recorder.take();
    assert!(subs.move_to(ChunkCoordinate::new(6, 5)).await.unwrap());
    let events = recorder.take();
    let mut added = subscribed(&events);
    added.sort();
    assert_eq!(
        added,
        (3..=7).map(|z| ChunkCoordinate::new(8, z)).collect::<Vec<_>>()
    );
    let mut removed = unsubscribed(&events);
    removed.sort();
    assert_eq!(
        removed,
        (3..=7).map(|z| ChunkCoordinate::new(3, z)).collect::<Vec<_>>()
    );
    // Additions go out before removals
    let last_subscribe = events
        .iter()
        .rposition(|e| matches!(e, LinkEvent::Subscribe(_)))
        .unwrap();
    let first_unsubscribe = events
        .iter()
        .position(|e| matches!(e, LinkEvent::Unsubscribe(_)))
        .unwrap();
    assert!(last_subscribe < first_unsubscribe);
    assert_eq!(subs.shard_count(), 1);
    assert_eq!(subs.subscription_count(ShardCoordinate::new(0, 0)), 25);
}

#[tokio::test]
async fn crossing_a_shard_boundary() {
    let (mut subs, recorder) = subscriptions(1);
    subs.init(ChunkCoordinate::new(14, 5)).await.unwrap();
    assert_eq!(subs.shard_count(), 1);
    recorder.take();

    subs.move_to(ChunkCoordinate::new(15, 5)).await.unwrap();
    let events = recorder.take();
    assert!(events.contains(&LinkEvent::Connect(ShardCoordinate::new(1, 0))));
    assert_eq!(subs.subscription_count(ShardCoordinate::new(1, 0)), 3);
    assert_eq!(subs.current_shard(), Some(ShardCoordinate::new(0, 0)));

    subs.move_to(ChunkCoordinate::new(16, 5)).await.unwrap();
    assert_eq!(subs.current_shard(), Some(ShardCoordinate::new(1, 0)));
    assert_eq!(subs.subscription_count(ShardCoordinate::new(0, 0)), 3);
    recorder.take();

    subs.move_to(ChunkCoordinate::new(18, 5)).await.unwrap();
    let events = recorder.take();
    assert!(events.contains(&LinkEvent::Disconnect(ShardCoordinate::new(0, 0))));
    assert_eq!(subs.shard_count(), 1);
    assert_eq!(subs.subscription_count(ShardCoordinate::new(1, 0)), 9);
}

#[tokio::test]
async fn teleporting_replaces_the_window() {
    let (mut subs, recorder) = subscriptions(1);
    subs.init(ChunkCoordinate::new(0, 0)).await.unwrap();
    recorder.take();
    subs.move_to(ChunkCoordinate::new(1000, -1000)).await.unwrap();
    let events = recorder.take();
    assert_eq!(subscribed(&events).len(), 9);
    assert_eq!(unsubscribed(&events).len(), 9);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, LinkEvent::Disconnect(_)))
            .count(),
        4
    );
    assert_eq!(subs.shard_count(), 1);
}

#[tokio::test]
async fn close_disconnects_everything() {
    let (mut subs, recorder) = subscriptions(1);
    subs.init(ChunkCoordinate::new(-16, 0)).await.unwrap();
    recorder.take();
    subs.close().await;
    let events = recorder.take();
    assert_eq!(unsubscribed(&events).len(), 9);
    let disconnected: FxHashSet<_> = events
        .iter()
        .filter_map(|e| match e {
            LinkEvent::Disconnect(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(disconnected.len(), 4);
    assert_eq!(subs.shard_count(), 0);
    assert_eq!(subs.current_chunk(), None);
    assert!(subs.current_link().is_none());
}

#[tokio::test]
async fn links_only_for_visible_chunks() {
    let (mut subs, _recorder) = subscriptions(1);
    subs.init(ChunkCoordinate::new(0, 0)).await.unwrap();
    assert!(subs.link_for_chunk(ChunkCoordinate::new(-1, 1)).is_some());
    assert!(subs.link_for_chunk(ChunkCoordinate::new(2, 0)).is_none());
    assert_eq!(
        subs.current_link().map(|l| l.shard),
        Some(ShardCoordinate::new(0, 0))
    );
}

#[tokio::test]
async fn failed_move_leaves_the_window_alone() {
    let (mut subs, recorder, unreachable) = flaky_subscriptions(1);
    let start = ChunkCoordinate::new(5, 14);
    let home = ShardCoordinate::new(0, 0);
    subs.init(start).await.unwrap();
    let mut events = recorder.take();
    unreachable.lock().insert(ShardCoordinate::new(0, 1));

    // Column x=7 is in reach before the row at z=16 hits the unreachable shard
    let target = ChunkCoordinate::new(6, 15);
    assert!(subs.move_to(target).await.is_err());
    let failed = recorder.take();
    assert!(subscribed(&failed).contains(&ChunkCoordinate::new(7, 14)));
    let mut added = subscribed(&failed);
    added.sort();
    let mut removed = unsubscribed(&failed);
    removed.sort();
    assert_eq!(added, removed);
    events.extend(failed);
    check_window(&events, start, 1);
    assert_eq!(subs.current_chunk(), Some(start));
    assert_eq!(subs.subscription_count(home), 9);

    unreachable.lock().clear();
    assert!(subs.move_to(target).await.unwrap());
    events.extend(recorder.take());
    check_window(&events, target, 1);
    assert_eq!(subs.subscription_count(home), 6);
    assert_eq!(subs.subscription_count(ShardCoordinate::new(0, 1)), 3);

    subs.move_to(ChunkCoordinate::new(6, 40)).await.unwrap();
    events.extend(recorder.take());
    check_window(&events, ChunkCoordinate::new(6, 40), 1);
    assert_eq!(subs.subscription_count(home), 0);
    assert_eq!(subs.shard_count(), 1);
}

#[tokio::test]
async fn failed_init_subscribes_nothing() {
    let (mut subs, recorder, unreachable) = flaky_subscriptions(1);
    unreachable.lock().insert(ShardCoordinate::new(-1, -1));
    assert!(subs.init(ChunkCoordinate::new(0, 0)).await.is_err());
    let events = recorder.take();
    assert_eq!(subscribed(&events).len(), unsubscribed(&events).len());
    assert_eq!(subs.shard_count(), 0);
    assert_eq!(subs.current_chunk(), None);
    assert!(subs.link_for_chunk(ChunkCoordinate::new(0, 0)).is_none());
}

// Replays the recorded events and checks the window invariant: every chunk within the radius
// has exactly one subscription and nothing else does, and shard links match what's in use.
fn check_window(events: &[LinkEvent], center: ChunkCoordinate, radius: i32) {
    let mut counts: BTreeMap<ChunkCoordinate, i32> = BTreeMap::new();
    let mut links: BTreeMap<ShardCoordinate, i32> = BTreeMap::new();
    for event in events {
        match event {
            LinkEvent::Subscribe(c) => *counts.entry(*c).or_default() += 1,
            LinkEvent::Unsubscribe(c) => *counts.entry(*c).or_default() -= 1,
            LinkEvent::Connect(s) => *links.entry(*s).or_default() += 1,
            LinkEvent::Disconnect(s) => *links.entry(*s).or_default() -= 1,
        }
    }
    counts.retain(|_, v| *v != 0);
    links.retain(|_, v| *v != 0);
    assert!(counts.values().all(|v| *v == 1), "{counts:?}");
    let mut expected = ordered_chunk_square(center, radius);
    expected.sort();
    assert_eq!(counts.keys().copied().collect::<Vec<_>>(), expected);
    let expected_shards: FxHashSet<_> = expected.iter().map(|c| c.shard()).collect();
    assert!(links.values().all(|v| *v == 1), "{links:?}");
    assert_eq!(links.len(), expected_shards.len());
    assert!(links.keys().all(|s| expected_shards.contains(s)));
}

proptest! {
    #[test]
    fn window_matches_position(
        radius in 0..4i32,
        start in (-40..40i32, -40..40i32),
        steps in prop::collection::vec((-3..=3i32, -3..=3i32), 1..20),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let (mut subs, recorder) = subscriptions(radius);
            let mut center = ChunkCoordinate::new(start.0, start.1);
            subs.init(center).await.unwrap();
            let mut events = recorder.take();
            check_window(&events, center, radius);
            for (dx, dz) in steps {
                center = ChunkCoordinate::new(center.x + dx, center.z + dz);
                subs.move_to(center).await.unwrap();
                events.extend(recorder.take());
                check_window(&events, center, radius);
            }
            subs.close().await;
            events.extend(recorder.take());
            assert!(subscribed(&events).len() == unsubscribed(&events).len());
        });
    }
}
