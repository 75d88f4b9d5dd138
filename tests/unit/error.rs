use std::io;

use transcode_relay::error::TranscodeError;

#[test]
fn config_helper_formats_message() {
    let err = TranscodeError::config("bad value");
    assert_eq!(err.to_string(), "invalid configuration: bad value");
}

#[test]
fn no_valid_profiles_names_the_request() {
    let err = TranscodeError::no_valid_profiles(&["bogus", "other"]);
    assert_eq!(
        err.to_string(),
        "no valid profiles selected (requested: bogus, other)"
    );
}

#[test]
fn spawn_error_mentions_program() {
    let err = TranscodeError::spawn(
        "/opt/ffmpeg/bin/ffmpeg",
        io::Error::new(io::ErrorKind::NotFound, "not found"),
    );
    assert!(err.to_string().contains("/opt/ffmpeg/bin/ffmpeg"));
}

#[test]
fn exit_codes_separate_failure_stages() {
    assert_eq!(TranscodeError::no_valid_profiles(&["x"]).exit_code(), 2);
    assert_eq!(TranscodeError::config("x").exit_code(), 2);
    assert_eq!(
        TranscodeError::spawn("ffmpeg", io::Error::from(io::ErrorKind::PermissionDenied))
            .exit_code(),
        3
    );
    assert_eq!(
        TranscodeError::StreamDrain {
            stream: "ffmpeg_stderr",
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        }
        .exit_code(),
        4
    );
}
