//! Error types used across modules.
//!
//! This module contains the error types that may be created and used within this crate. See
//! individual error types for documentation.

use std::io;
use thiserror::Error;

/// The error type for opening and writing to an output sink.
#[derive(Debug, Error)]
pub enum SinkError {
	/// The host has no default audio output device.
	#[error("no default audio output device")]
	NoDevice,
	/// The audio device rejected the stream configuration.
	#[error("failed to build audio stream: {0}")]
	BuildStream(#[from] cpal::BuildStreamError),
	/// The audio stream could not be started.
	#[error("failed to start audio stream: {0}")]
	PlayStream(#[from] cpal::PlayStreamError),
	/// The audio stream reported an error after it was started. Once this happens, every
	/// subsequent write fails.
	#[error("audio stream failed: {0}")]
	Stream(String),
	/// Creating, writing or finalizing a WAV file failed.
	#[error("WAV output error: {0}")]
	Wav(#[from] hound::Error)
}

/// The error type for playback sessions.
#[derive(Debug, Error)]
pub enum PlayerError {
	/// Encoding or rendering failed. The payload describes the invalid input.
	#[error(transparent)]
	Signal(#[from] signals::Error),
	/// The output sink could not be opened.
	#[error("failed to open output: {0}")]
	Sink(#[from] SinkError),
	/// The playback thread could not be started.
	#[error("failed to start playback thread: {0}")]
	Spawn(#[source] io::Error),
	/// The playback thread exited before reporting whether the sink was opened.
	#[error("playback thread exited before opening its output")]
	Disconnected
}
