//! SpeechCapture against a scripted recognizer.

mod common;

use common::{settle, Script, ScriptedManual, ScriptedRecognizer};
use crm_voice::{CaptureConfig, CaptureError, SpeechCapture};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn capture(recognizer: &Arc<ScriptedRecognizer>) -> SpeechCapture {
    SpeechCapture::new(recognizer.clone(), CaptureConfig::default())
}

#[tokio::test(start_paused = true)]
async fn final_transcript_is_normalized() {
    let recognizer = ScriptedRecognizer::new([Script::Final("  گزارش   كار  احمد ")]);
    let transcript = capture(&recognizer).start_listening().await.unwrap();

    assert_eq!(transcript, "گزارش کار احمد");
    let request = &recognizer.requests()[0];
    assert_eq!(request.language, "fa-IR");
    assert!(request.interim_results);
    assert!(!request.continuous);
    assert_eq!(request.max_alternatives, 3);
}

#[tokio::test(start_paused = true)]
async fn interim_results_never_resolve() {
    let recognizer = ScriptedRecognizer::new([Script::InterimThenFinal("گزا", "گزارش فروش")]);
    let capture = capture(&recognizer);
    let interim = capture.interim();

    let transcript = capture.start_listening().await.unwrap();

    assert_eq!(transcript, "گزارش فروش");
    assert_eq!(*interim.borrow(), "گزا");
}

#[tokio::test(start_paused = true)]
async fn network_failure_is_retried_three_times() {
    let recognizer = ScriptedRecognizer::new(std::iter::repeat(Script::Error("network")).take(6));
    let started = Instant::now();

    let err = capture(&recognizer).start_listening().await.unwrap_err();

    assert_eq!(err, CaptureError::Network);
    assert_eq!(recognizer.starts(), 4);
    assert!(started.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn network_retry_can_recover() {
    let recognizer = ScriptedRecognizer::new([Script::Error("network"), Script::Final("سلام")]);
    assert_eq!(capture(&recognizer).start_listening().await.unwrap(), "سلام");
    assert_eq!(recognizer.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn permission_denied_is_never_retried() {
    let recognizer = ScriptedRecognizer::new([Script::Error("not-allowed"), Script::Final("سلام")]);
    let err = capture(&recognizer).start_listening().await.unwrap_err();

    assert_eq!(err, CaptureError::PermissionDenied);
    assert_eq!(recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn no_speech_fails_immediately() {
    let recognizer = ScriptedRecognizer::new([Script::Error("no-speech")]);
    assert_eq!(
        capture(&recognizer).start_listening().await.unwrap_err(),
        CaptureError::NoSpeech
    );

    let recognizer = ScriptedRecognizer::new([Script::EndWithoutResult]);
    assert_eq!(
        capture(&recognizer).start_listening().await.unwrap_err(),
        CaptureError::NoSpeech
    );
    assert_eq!(recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn watchdog_stops_silent_capture() {
    let recognizer = ScriptedRecognizer::new([Script::Silence]);
    let capture = capture(&recognizer);
    let started = Instant::now();

    let err = capture.start_listening().await.unwrap_err();

    assert_eq!(err, CaptureError::Timeout);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
    assert_eq!(recognizer.control.stops.load(Ordering::SeqCst), 1);
    assert!(!capture.is_listening());
}

#[tokio::test(start_paused = true)]
async fn unsupported_language_walks_fallback_chain() {
    let recognizer = ScriptedRecognizer::new([
        Script::Error("language-not-supported"),
        Script::Silence,
        Script::Final("report for Ali"),
    ]);
    let started = Instant::now();

    let transcript = capture(&recognizer).start_listening().await.unwrap();

    assert_eq!(transcript, "report for Ali");
    assert_eq!(recognizer.languages(), vec!["fa-IR", "fa", "ar-SA"]);
    // The silent alternate gets its own 10 s watchdog, not the 30 s one.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn exhausted_fallback_chain_fails() {
    let recognizer =
        ScriptedRecognizer::new(std::iter::repeat(Script::Error("language-not-supported")).take(4));
    let err = capture(&recognizer).start_listening().await.unwrap_err();

    assert_eq!(err, CaptureError::LanguageUnsupported);
    assert_eq!(recognizer.languages(), vec!["fa-IR", "fa", "ar-SA", "en-US"]);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_shared_with_fallback_languages() {
    let mut scripts = vec![Script::Error("language-not-supported")];
    scripts.extend(std::iter::repeat(Script::Error("network")).take(6));
    let recognizer = ScriptedRecognizer::new(scripts);

    let err = capture(&recognizer).start_listening().await.unwrap_err();

    assert_eq!(err, CaptureError::Network);
    // Primary attempt, then the first alternate with its original try plus three retries.
    assert_eq!(recognizer.starts(), 5);
    assert!(recognizer.languages()[1..].iter().all(|l| l == "fa"));
}

#[tokio::test(start_paused = true)]
async fn second_capture_is_rejected_and_stop_aborts() {
    let recognizer = ScriptedRecognizer::new([Script::Silence]);
    let capture = Arc::new(capture(&recognizer));

    let running = tokio::spawn({
        let capture = capture.clone();
        async move { capture.start_listening().await }
    });
    settle(|| capture.is_listening()).await;

    assert_eq!(
        capture.start_listening().await.unwrap_err(),
        CaptureError::AlreadyActive
    );
    assert_eq!(recognizer.starts(), 1);

    capture.stop();
    capture.stop();

    assert_eq!(running.await.unwrap().unwrap_err(), CaptureError::Aborted);
    assert!(recognizer.control.aborts.load(Ordering::SeqCst) >= 1);
    assert!(!capture.is_listening());
}

#[tokio::test]
async fn unavailable_recognizer_is_unsupported() {
    let recognizer = ScriptedRecognizer::unavailable();
    let capture = capture(&recognizer);

    assert!(!capture.is_supported());
    assert_eq!(
        capture.start_listening().await.unwrap_err(),
        CaptureError::Unsupported
    );
    assert_eq!(recognizer.starts(), 0);
}

#[tokio::test]
async fn microphone_probe_never_fails() {
    let recognizer = ScriptedRecognizer::new([]);
    let capture = capture(&recognizer);
    assert!(capture.test_microphone().await);

    recognizer.microphone_ok.store(false, Ordering::SeqCst);
    assert!(!capture.test_microphone().await);
}

#[tokio::test]
async fn manual_input_outcomes() {
    let recognizer = ScriptedRecognizer::unavailable();

    let typed = capture(&recognizer).with_manual_input(Arc::new(ScriptedManual(Some(" گزارش كار "))));
    assert_eq!(typed.get_manual_input().await.unwrap(), "گزارش کار");

    let declined = capture(&recognizer).with_manual_input(Arc::new(ScriptedManual(None)));
    assert_eq!(
        declined.get_manual_input().await.unwrap_err(),
        CaptureError::ManualInputCancelled
    );

    let blank = capture(&recognizer).with_manual_input(Arc::new(ScriptedManual(Some("   "))));
    assert_eq!(
        blank.get_manual_input().await.unwrap_err(),
        CaptureError::ManualInputEmpty
    );

    assert_eq!(
        capture(&recognizer).get_manual_input().await.unwrap_err(),
        CaptureError::Unsupported
    );
}
