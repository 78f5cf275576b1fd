//! Engine behavior against scripted collaborators.

mod common;

use std::time::Duration;

use coda::auth::OAuthResult;
use coda::connect::{DeviceConfig, DeviceType, SessionEvent};
use coda::error::Error;
use coda::settings::Bitrate;

use common::{eventually, harness, track_uri, track_uris, Command, TOKEN};

#[test]
fn commands_without_session_fail() {
    let h = harness();

    assert!(matches!(
        h.player.play_tracks(&track_uris(2)),
        Err(Error::NoActiveSession)
    ));
    assert!(matches!(h.player.pause(), Err(Error::NoActiveSession)));
    assert!(matches!(h.player.next(), Err(Error::NoActiveSession)));
    assert!(matches!(h.player.seek(1000), Err(Error::NoActiveSession)));
    assert!(matches!(
        h.player.set_volume(100),
        Err(Error::NoActiveSession)
    ));

    // Reads fall back to quiet defaults.
    assert!(!h.player.is_playing());
    assert_eq!(h.player.position_ms(), 0);
    assert_eq!(h.player.queue_length(), 0);
    assert_eq!(h.player.current_index(), None);
    assert_eq!(h.player.volume(), None);
}

#[test]
fn init_is_exclusive_and_cleanup_idempotent() {
    let h = harness();
    h.init();

    let device = DeviceConfig::new("second", DeviceType::Speaker).unwrap();
    assert!(matches!(
        h.player.init(TOKEN, device),
        Err(Error::SessionAlreadyActive)
    ));

    h.player.cleanup();
    h.player.cleanup();
    assert_eq!(h.recorder.commands().last(), Some(&Command::Close));

    // A fresh session can be established after cleanup.
    h.init();
}

#[test]
fn init_rejects_empty_token() {
    let h = harness();
    let device = DeviceConfig::new("unit", DeviceType::Computer).unwrap();
    assert!(h.player.init("", device).is_err());
}

#[test]
fn settings_snapshot_is_fixed_at_init() {
    let h = harness();

    h.player.set_bitrate(Bitrate::High);
    h.init();
    assert_eq!(
        h.player.effective_settings().map(|s| s.bitrate),
        Some(Bitrate::High)
    );

    // Mutating the store while the session is live changes nothing.
    h.player.set_bitrate(Bitrate::Low);
    h.player.set_gapless(false);
    let effective = h.player.effective_settings().unwrap();
    assert_eq!(effective.bitrate, Bitrate::High);
    assert!(effective.gapless);

    // The next session picks the new values up.
    h.player.cleanup();
    h.init();
    let effective = h.player.effective_settings().unwrap();
    assert_eq!(effective.bitrate, Bitrate::Low);
    assert!(!effective.gapless);

    let seen = h.connector.settings_seen();
    assert_eq!(seen[0].bitrate, Bitrate::High);
    assert_eq!(seen[1].bitrate, Bitrate::Low);
}

#[test]
fn play_tracks_replaces_queue_and_starts_at_head() {
    let h = harness();
    h.init();

    let uris = track_uris(3);
    h.player.play_tracks(&uris).expect("play should succeed");

    assert_eq!(h.player.queue_length(), 3);
    assert_eq!(h.player.current_index(), Some(0));
    assert!(h.player.is_playing());
    assert_eq!(
        h.recorder.commands().last(),
        Some(&Command::Load {
            uri: uris[0].clone(),
            start_playing: true,
            position_ms: 0,
        })
    );

    // Metadata fills in lazily.
    assert!(eventually(|| {
        (0..3).all(|i| h.player.queue_item(i).is_some_and(|item| item.is_resolved()))
    }));
    let item = h.player.queue_item(1).unwrap();
    assert_eq!(item.metadata.unwrap().track_name, "Track t1");
}

#[test]
fn play_tracks_rejects_bad_input() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(2)).unwrap();

    assert!(matches!(
        h.player.play_tracks(&[]),
        Err(Error::InvalidInput(_))
    ));
    assert!(h
        .player
        .play_tracks(&[String::from("spotify:album:abc123")])
        .is_err());
    assert!(h.player.play_tracks(&[String::from("garbage")]).is_err());

    // Failed replacements leave the queue untouched.
    assert_eq!(h.player.queue_length(), 2);
    assert_eq!(h.player.current_index(), Some(0));
}

#[test]
fn play_track_expands_collections() {
    let h = harness();
    h.init();

    h.player
        .play_track("https://open.spotify.com/album/abc123")
        .expect("album should expand");

    assert_eq!(h.player.queue_length(), 3);
    assert_eq!(h.player.current_index(), Some(0));
    assert!(h
        .player
        .queue_item(0)
        .is_some_and(|item| item.uri == "spotify:track:abc123x0"));
}

#[test]
fn jump_out_of_bounds_leaves_state_unchanged() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(5)).unwrap();

    assert!(matches!(
        h.player.jump_to_index(7),
        Err(Error::IndexOutOfBounds { index: 7, len: 5 })
    ));
    assert_eq!(h.player.current_index(), Some(0));

    h.player.jump_to_index(3).expect("index 3 is in bounds");
    assert_eq!(h.player.current_index(), Some(3));
}

#[test]
fn next_and_previous_do_not_wrap() {
    let h = harness();
    h.init();
    let uris = track_uris(2);
    h.player.play_tracks(&uris).unwrap();

    assert!(h.player.previous().is_err());
    assert_eq!(h.player.current_index(), Some(0));

    h.player.next().expect("next from head should succeed");
    assert_eq!(h.player.current_index(), Some(1));
    assert_eq!(
        h.recorder.commands().last(),
        Some(&Command::Load {
            uri: uris[1].clone(),
            start_playing: true,
            position_ms: 0,
        })
    );

    assert!(h.player.next().is_err());
    assert_eq!(h.player.current_index(), Some(1));

    h.player.previous().expect("previous should succeed");
    assert_eq!(h.player.current_index(), Some(0));
}

#[test]
fn pause_freezes_the_position_clock() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(1)).unwrap();

    h.player.pause().expect("pause should succeed");
    assert!(!h.player.is_playing());

    let frozen = h.player.position_ms();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(h.player.position_ms(), frozen);

    h.player.resume().expect("resume should succeed");
    assert!(h.player.is_playing());
    std::thread::sleep(Duration::from_millis(100));
    assert!(h.player.position_ms() >= frozen + 50);

    let commands = h.recorder.commands();
    assert!(commands.contains(&Command::Pause));
    assert!(commands.contains(&Command::Resume));
}

#[test]
fn pause_without_content_fails() {
    let h = harness();
    h.init();
    assert!(matches!(h.player.pause(), Err(Error::InvalidInput(_))));
}

#[test]
fn seek_validates_against_known_duration() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(1)).unwrap();
    assert!(eventually(|| {
        h.player.queue_item(0).is_some_and(|item| item.is_resolved())
    }));

    // Canned duration is 180000 ms, tolerance 1000 ms.
    h.player.seek(10_000).expect("seek should succeed");
    let position = h.player.position_ms();
    assert!(
        (10_000..11_000).contains(&position),
        "position was {position}"
    );
    assert!(h.recorder.commands().contains(&Command::Seek(10_000)));

    assert!(matches!(
        h.player.seek(200_000),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn stop_destroys_the_queue() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(3)).unwrap();

    h.player.stop().expect("stop should succeed");
    assert_eq!(h.player.queue_length(), 0);
    assert_eq!(h.player.current_index(), None);
    assert!(!h.player.is_playing());
    assert_eq!(h.player.position_ms(), 0);
    assert!(h.recorder.commands().contains(&Command::Stop));

    // No active content anymore.
    assert!(h.player.stop().is_err());
}

#[test]
fn queue_edits_respect_the_cursor() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(3)).unwrap();
    h.player.jump_to_index(1).unwrap();

    h.player
        .add_next_to_queue(&track_uri("inserted"))
        .expect("insert should succeed");
    assert_eq!(h.player.queue_length(), 4);
    assert!(h
        .player
        .queue_item(2)
        .is_some_and(|item| item.uri == track_uri("inserted")));
    // Inserted items arrive resolved.
    assert!(h.player.queue_item(2).unwrap().is_resolved());

    h.player
        .add_to_queue(&track_uri("appended"))
        .expect("append should succeed");
    assert!(h
        .player
        .queue_item(4)
        .is_some_and(|item| item.uri == track_uri("appended")));
    assert_eq!(h.player.current_index(), Some(1));

    // Played and current items are protected.
    assert!(h.player.remove_from_queue(0).is_err());
    assert!(h.player.remove_from_queue(1).is_err());
    h.player.remove_from_queue(4).expect("tail is removable");

    h.player.move_queue_item(2, 3).expect("move should succeed");
    assert!(h
        .player
        .queue_item(3)
        .is_some_and(|item| item.uri == track_uri("inserted")));

    h.player.clear_upcoming_queue().unwrap();
    assert_eq!(h.player.queue_length(), 2);
    assert_eq!(h.player.current_index(), Some(1));
}

#[test]
fn collection_uris_are_rejected_for_queue_edits() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(1)).unwrap();

    assert!(h.player.add_to_queue("spotify:album:abc123").is_err());
    assert!(h.player.add_next_to_queue("spotify:playlist:p1").is_err());
    assert_eq!(h.player.queue_length(), 1);
}

#[test]
fn radio_is_read_only() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(2)).unwrap();

    let uris = h
        .player
        .radio_tracks(&track_uri("seed"))
        .expect("radio should succeed");
    assert_eq!(uris.len(), 5);
    assert_eq!(h.player.queue_length(), 2);

    assert!(h.player.radio_tracks("spotify:album:abc123").is_err());
}

#[test]
fn volume_round_trips_through_the_session() {
    let h = harness();
    h.init();

    h.player.set_volume(12_345).expect("volume should set");
    assert_eq!(h.player.volume(), Some(12_345));
    assert!(h.recorder.commands().contains(&Command::SetVolume(12_345)));
}

#[test]
fn end_of_track_auto_advances() {
    let h = harness();
    h.init();
    let uris = track_uris(2);
    h.player.play_tracks(&uris).unwrap();

    h.connector.send(SessionEvent::EndOfTrack);

    assert!(eventually(|| h.player.current_index() == Some(1)));
    assert!(h.player.is_playing());
    assert!(h.recorder.commands().contains(&Command::Load {
        uri: uris[1].clone(),
        start_playing: true,
        position_ms: 0,
    }));
}

#[test]
fn end_of_track_at_tail_stops_playing() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(1)).unwrap();

    h.connector.send(SessionEvent::EndOfTrack);

    assert!(eventually(|| !h.player.is_playing()));
    assert_eq!(h.player.current_index(), Some(0));
    assert_eq!(h.player.queue_length(), 1);
}

#[test]
fn transport_events_resync_the_clock() {
    let h = harness();
    h.init();
    h.player.play_tracks(&track_uris(1)).unwrap();

    h.connector.send(SessionEvent::Position { position_ms: 42_000 });
    assert!(eventually(|| {
        let position = h.player.position_ms();
        (42_000..43_000).contains(&position)
    }));

    h.connector.send(SessionEvent::Paused { position_ms: 50_000 });
    assert!(eventually(|| !h.player.is_playing()));
    assert_eq!(h.player.position_ms(), 50_000);
}

#[test]
fn oauth_result_lands_in_the_mailbox() {
    let h = harness();

    h.player
        .start_oauth("client-id", "http://127.0.0.1:8888/callback")
        .expect("flow should start");

    assert!(eventually(|| h.player.has_oauth_result()));
    let result = h.player.take_oauth_result().expect("result should be set");
    assert!(matches!(result, OAuthResult::Completed(_)));

    assert_eq!(h.player.access_token().as_deref(), Some("flow-access"));
    assert_eq!(h.player.refresh_token().as_deref(), Some("flow-refresh"));
    let remaining = h.player.token_expires_in().expect("token should be live");
    assert!(remaining <= Duration::from_secs(3600));
    assert!(remaining > Duration::from_secs(3500));

    // The mailbox is single-slot; taking it empties it.
    assert!(!h.player.has_oauth_result());
}

#[test]
fn managed_token_keeps_its_expiry_at_init() {
    let h = harness();
    h.player
        .start_oauth("client-id", "http://127.0.0.1:8888/callback")
        .unwrap();
    assert!(eventually(|| h.player.has_oauth_result()));
    h.player.clear_oauth_result();

    let device = DeviceConfig::new("unit", DeviceType::Computer).unwrap();
    h.player
        .init("flow-access", device)
        .expect("init with the managed token should succeed");
}
