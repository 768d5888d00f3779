#![no_main]

use aurion::core::PlayQueue;
use aurion::model::RepeatMode;
use libfuzzer_sys::fuzz_target;
use std::path::PathBuf;

fuzz_target!(|data: &[u8]| {
    let Some((seed, commands)) = data.split_first() else {
        return;
    };
    let mut queue = PlayQueue::with_seed(u64::from(*seed));
    let len = (commands.len() % 32).max(1);
    queue.add_tracks((0..len).map(|idx| PathBuf::from(format!("track_{idx}.mp3"))));

    for byte in commands {
        let arg = usize::from(byte >> 4);
        match byte % 10 {
            0 => queue.set_repeat(RepeatMode::Off),
            1 => queue.set_repeat(RepeatMode::All),
            2 => queue.set_repeat(RepeatMode::One),
            3 => {
                queue.toggle_shuffle();
            }
            4 => {
                let peeked = queue.next_index();
                if let Some(transition) = queue.advance(arg % 2 == 0) {
                    assert!(transition.index() < queue.len());
                    if let (Some(peeked), true) = (peeked, transition.changes_track()) {
                        assert_eq!(peeked, transition.index());
                    }
                }
            }
            5 => {
                queue.go_back();
            }
            6 => {
                queue.select(arg, arg % 3 == 0);
            }
            7 => {
                let doomed = vec![PathBuf::from(format!("track_{arg}.mp3"))];
                queue.remove_tracks(&doomed);
                queue.repair();
            }
            8 => {
                queue.add_tracks([format!("track_{arg}.mp3")]);
                queue.repair();
            }
            _ => {
                if let Some(target) = queue.next_index() {
                    assert!(queue.commit_crossfade(target));
                }
            }
        }

        if let Some(current) = queue.current() {
            assert!(current < queue.len());
        }
        let shuffle = queue.shuffle();
        assert!(shuffle.pool.iter().all(|index| *index < queue.len()));
        assert!(shuffle.history.iter().all(|index| *index < queue.len()));
    }
});
