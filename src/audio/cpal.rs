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
use std::{collections::HashMap, error::Error, fmt, sync::Arc, thread, time::Duration};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, warn, Level};

use super::mixer::{ActiveVoice, AudioMixer};
use super::{
    check_voice, render, Completion, PlaybackError, Quality, RenderError, SampleBuffer,
    VoiceHandle,
};
use crate::config;

/// A summary of an output device, used for listing.
pub struct DeviceInfo {
    /// The name of the device.
    pub name: String,
    /// The maximum number of channels the device supports.
    pub max_channels: u16,
    /// The host ID of the device.
    pub host_id: cpal::HostId,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Completion callbacks waiting for their voice to end, by voice ID.
type PendingCompletions = Arc<Mutex<HashMap<u64, Completion>>>;

/// An engine that plays voices through a cpal output device.
pub struct Engine {
    /// The name of the device.
    name: String,
    /// Mixes voices into the output stream.
    mixer: AudioMixer,
    /// Completions for voices the mixer hasn't finished yet.
    completions: PendingCompletions,
    /// Interpolation used for offline rendering.
    quality: Quality,
    /// Handle to the output thread (keeps the stream alive).
    output_thread: Option<thread::JoinHandle<()>>,
    /// Handle to the thread that delivers completions.
    notifier_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, {}Hz)",
            self.name,
            self.mixer.num_channels(),
            self.mixer.sample_rate()
        )
    }
}

/// f32 callback: mix directly into the cpal buffer.
fn create_f32_callback(
    mixer: AudioMixer,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        mixer.process_into_output(data);
    }
}

/// Integer callback: mix into scratch space and convert.
fn create_converting_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    mixer: AudioMixer,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        mixer.process_into_output(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

impl Engine {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<DeviceInfo> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let output_configs = match device.supported_output_configs() {
                    Ok(output_configs) => output_configs,
                    Err(_) => continue,
                };
                let max_channels = output_configs.map(|c| c.channels()).max().unwrap_or(0);

                if max_channels > 0 {
                    devices.push(DeviceInfo {
                        name: device.description()?.name().to_string(),
                        max_channels,
                        host_id,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Finds the configured device, or the host default for "default".
    fn find_device(name: &str) -> Result<cpal::Device, Box<dyn Error>> {
        let host = cpal::default_host();
        if name == "default" {
            return host
                .default_output_device()
                .ok_or_else(|| "no default output device".into());
        }

        for device in host.output_devices()? {
            if device
                .description()
                .is_ok_and(|description| description.name().trim() == name)
            {
                return Ok(device);
            }
        }
        Err(format!("no device found with name {}", name).into())
    }

    /// Opens the configured device and starts its output stream.
    pub fn get(config: &config::Audio, quality: Quality) -> Result<Engine, Box<dyn Error>> {
        let name = config.device();
        let device = Self::find_device(name)?;
        let default_config = device.default_output_config()?;
        let sample_format = default_config.sample_format();
        let num_channels = default_config.channels();
        let sample_rate = config.sample_rate().unwrap_or(default_config.sample_rate());

        let (finished_tx, finished_rx) = crossbeam_channel::unbounded::<u64>();
        let mixer = AudioMixer::new(num_channels, sample_rate, finished_tx);
        let completions: PendingCompletions = Arc::new(Mutex::new(HashMap::new()));

        let notifier_thread = {
            let completions = completions.clone();
            thread::spawn(move || {
                for id in finished_rx.iter() {
                    let completion = completions.lock().remove(&id);
                    match completion {
                        Some(completion) => {
                            debug!(voice = id, "Voice ended");
                            completion();
                        }
                        None => warn!(voice = id, "Voice ended without a completion"),
                    }
                }
            })
        };

        let stream_config = cpal::StreamConfig {
            channels: num_channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let output_thread = {
            let mixer = mixer.clone();
            let device_name = name.to_string();
            // cpal streams aren't Send, so the stream lives and dies on its own thread.
            thread::spawn(move || {
                let stream_result = match sample_format {
                    cpal::SampleFormat::F32 => device.build_output_stream(
                        &stream_config,
                        create_f32_callback(mixer),
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    ),
                    cpal::SampleFormat::I16 => device.build_output_stream(
                        &stream_config,
                        create_converting_callback::<i16>(mixer),
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    ),
                    cpal::SampleFormat::I32 => device.build_output_stream(
                        &stream_config,
                        create_converting_callback::<i32>(mixer),
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    ),
                    other => {
                        error!(format = ?other, "Unsupported output sample format");
                        return;
                    }
                };

                match stream_result {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            error!("Failed to start CPAL stream: {}", e);
                            return;
                        }
                        info!(device = device_name, "CPAL output stream started");

                        // Keep the stream alive.
                        loop {
                            thread::park_timeout(Duration::from_millis(100));
                        }
                    }
                    Err(e) => {
                        error!("Failed to create CPAL stream: {}", e);
                    }
                }
            })
        };

        Ok(Engine {
            name: name.to_string(),
            mixer,
            completions,
            quality,
            output_thread: Some(output_thread),
            notifier_thread: Some(notifier_thread),
        })
    }

    /// Returns true if the output thread is still running.
    pub fn is_running(&self) -> bool {
        self.output_thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
            && self
                .notifier_thread
                .as_ref()
                .is_some_and(|thread| !thread.is_finished())
    }
}

impl super::Engine for Engine {
    fn start_voice(
        &self,
        buffer: Arc<SampleBuffer>,
        rate: f64,
        on_complete: Completion,
    ) -> Result<VoiceHandle, PlaybackError> {
        let span = span!(Level::INFO, "start voice (cpal)");
        let _enter = span.enter();

        check_voice(&buffer, rate)?;
        if !self.is_running() {
            return Err(PlaybackError::Device(format!(
                "output stream for {} is not running",
                self.name
            )));
        }

        let handle = VoiceHandle::new(rate);
        info!(
            device = self.name,
            voice = handle.id(),
            rate,
            duration = format!("{:?}", buffer.duration().div_f64(rate)),
            "Starting voice."
        );

        // Register the completion before the mixer can possibly finish the voice.
        self.completions.lock().insert(handle.id(), on_complete);
        self.mixer.add_voice(ActiveVoice::new(
            handle.id(),
            buffer,
            rate,
            self.mixer.sample_rate(),
            handle.cancel_handle(),
        ));

        Ok(handle)
    }

    fn stop_voice(&self, handle: &VoiceHandle) {
        if handle.cancel_handle().cancel() {
            info!(device = self.name, voice = handle.id(), "Stopping voice.");
        }
    }

    fn render_offline(
        &self,
        buffer: &SampleBuffer,
        rate: f64,
        output_length: usize,
    ) -> Result<SampleBuffer, RenderError> {
        render::render(buffer, rate, output_length, self.quality)
    }
}
