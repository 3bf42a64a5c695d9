// tests/properties.rs

use std::collections::BTreeSet;

use proptest::prelude::*;
use taskstatus::codec::{Frame, Value, decode, encode_map};
use taskstatus::engine::MessageProcessor;
use taskstatus::job::JobContext;
use taskstatus::state::{CollectorState, PendingSet};
use taskstatus_test_utils::builders::{MessageBuilder, tagged_bytes};

fn apply(processor: &MessageProcessor, state: &mut CollectorState, line: &str) -> bool {
    match decode(line.as_bytes()).unwrap() {
        Frame::Message(fields) => processor.process_fields(state, fields).keep_running,
        Frame::EndOfStream => true,
    }
}

proptest! {
    #[test]
    fn tagged_bytes_decode_to_the_original(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
        let line = MessageBuilder::running("t")
            .field("blob", tagged_bytes(&payload))
            .line();

        let Frame::Message(fields) = decode(line.as_bytes()).unwrap() else {
            panic!("expected a message");
        };
        prop_assert_eq!(fields.get("blob"), Some(&Value::Bytes(payload.clone())));

        // And back out again unchanged.
        let Frame::Message(again) = decode(encode_map(&fields).as_bytes()).unwrap() else {
            panic!("expected a message");
        };
        prop_assert_eq!(again, fields);
    }

    #[test]
    fn pending_shrinks_by_distinct_finished_members(
        pending in proptest::collection::btree_set(0u8..12, 0..8),
        finishes in proptest::collection::vec(0u8..16, 0..24),
    ) {
        let processor = MessageProcessor::new(JobContext::with_unique_id("/j", "u"), false);
        let ids: Vec<String> = pending.iter().map(|n| format!("t{n}")).collect();
        let mut state = CollectorState::new(PendingSet::new(ids.iter().map(String::as_str)));

        let mut started = BTreeSet::new();
        let mut finished_members = BTreeSet::new();
        for n in &finishes {
            let id = format!("t{n}");
            if started.insert(n) {
                apply(&processor, &mut state, &MessageBuilder::started(&id, 0.0).line());
            }
            let keep_running =
                apply(&processor, &mut state, &MessageBuilder::finished(&id, 1.0, "pass").line());
            if pending.contains(n) {
                finished_members.insert(*n);
            }
            prop_assert_eq!(
                keep_running,
                pending.is_empty() || finished_members.len() < pending.len()
            );
        }

        prop_assert_eq!(state.pending.len(), pending.len() - finished_members.len());
        // One registry entry per id, however many messages it got.
        prop_assert_eq!(state.registry.len(), started.len());
        // A second `finished` for a task is rejected, so each id is indexed once.
        prop_assert_eq!(state.results.total(), started.len());
    }
}
