//! C boundary conventions that hold without a live session.

use std::ffi::CString;
use std::ptr;

use coda::ffi;

#[test]
fn free_string_accepts_null() {
    unsafe { ffi::coda_free_string(ptr::null_mut()) };
}

#[test]
fn reads_report_quiet_defaults_without_a_session() {
    assert_eq!(ffi::coda_is_playing(), 0);
    assert_eq!(ffi::coda_get_position_ms(), 0);
    assert_eq!(ffi::coda_get_queue_length(), 0);
    assert_eq!(ffi::coda_get_current_index(), 0);
    assert_eq!(ffi::coda_get_volume(), -1);

    assert!(ffi::coda_get_queue_uri(0).is_null());
    assert!(ffi::coda_get_queue_track_name(0).is_null());
    assert!(ffi::coda_get_queue_artist_name(0).is_null());
    assert!(ffi::coda_get_queue_album_art_url(0).is_null());
    assert!(ffi::coda_get_queue_album_id(0).is_null());
    assert!(ffi::coda_get_queue_artist_id(0).is_null());
    assert!(ffi::coda_get_queue_external_url(0).is_null());
    assert_eq!(ffi::coda_get_queue_duration_ms(0), 0);
    assert!(ffi::coda_get_all_queue_items().is_null());
}

#[test]
fn token_reads_report_absent_before_authorization() {
    assert!(!ffi::coda_has_oauth_result());
    assert!(ffi::coda_get_access_token().is_null());
    assert!(ffi::coda_get_refresh_token().is_null());
    assert_eq!(ffi::coda_get_token_expires_in(), -1);
    ffi::coda_clear_oauth_result();
}

#[test]
fn commands_fail_without_a_session() {
    let uri = CString::new("spotify:track:abc123").unwrap();
    let json = CString::new(r#"["spotify:track:abc123"]"#).unwrap();

    assert_eq!(unsafe { ffi::coda_play_tracks(json.as_ptr()) }, -1);
    assert_eq!(unsafe { ffi::coda_play_track(uri.as_ptr()) }, -1);
    assert_eq!(ffi::coda_pause(), -1);
    assert_eq!(ffi::coda_resume(), -1);
    assert_eq!(ffi::coda_stop(), -1);
    assert_eq!(ffi::coda_next(), -1);
    assert_eq!(ffi::coda_previous(), -1);
    assert_eq!(ffi::coda_seek(1000), -1);
    assert_eq!(ffi::coda_jump_to_index(0), -1);
    assert_eq!(unsafe { ffi::coda_add_to_queue(uri.as_ptr()) }, -1);
    assert_eq!(unsafe { ffi::coda_add_next_to_queue(uri.as_ptr()) }, -1);
    assert_eq!(ffi::coda_remove_from_queue(1), -1);
    assert_eq!(ffi::coda_move_queue_item(1, 2), -1);
    assert_eq!(ffi::coda_clear_upcoming_queue(), -1);
    assert_eq!(ffi::coda_set_volume(100), -1);
    assert!(unsafe { ffi::coda_get_radio_tracks(uri.as_ptr()) }.is_null());
}

#[test]
fn null_and_malformed_arguments_are_rejected() {
    assert_eq!(unsafe { ffi::coda_play_tracks(ptr::null()) }, -1);
    assert_eq!(unsafe { ffi::coda_play_track(ptr::null()) }, -1);
    assert_eq!(unsafe { ffi::coda_add_to_queue(ptr::null()) }, -1);
    assert_eq!(
        unsafe { ffi::coda_start_oauth(ptr::null(), ptr::null()) },
        -1
    );
    assert!(unsafe { ffi::coda_get_radio_tracks(ptr::null()) }.is_null());

    let not_json = CString::new("not json").unwrap();
    assert_eq!(unsafe { ffi::coda_play_tracks(not_json.as_ptr()) }, -1);

    assert_eq!(unsafe { ffi::coda_init_player(ptr::null(), ptr::null(), 0) }, -1);
}

#[test]
fn init_validates_before_any_network_traffic() {
    let empty = CString::new("").unwrap();
    assert_eq!(unsafe { ffi::coda_init_player(empty.as_ptr(), ptr::null(), 0) }, -1);

    // Unknown device type fails before the session is attempted.
    let token = CString::new("some-token").unwrap();
    assert_eq!(unsafe { ffi::coda_init_player(token.as_ptr(), ptr::null(), 9) }, -1);

    // Cleanup without a session is a no-op.
    ffi::coda_cleanup();
}

#[test]
fn settings_setters_cannot_fail_and_round_trip() {
    ffi::coda_set_bitrate(0);
    assert_eq!(ffi::coda_get_bitrate(), 0);
    ffi::coda_set_bitrate(2);
    assert_eq!(ffi::coda_get_bitrate(), 2);
    // Levels above the highest saturate.
    ffi::coda_set_bitrate(200);
    assert_eq!(ffi::coda_get_bitrate(), 2);

    ffi::coda_set_gapless(false);
    assert!(!ffi::coda_get_gapless());
    ffi::coda_set_gapless(true);
    assert!(ffi::coda_get_gapless());

    ffi::coda_set_bitrate(1);
}
