//! `DeviceSession`: the OPI machine for one Daydream headset.
//!
//! A session owns the single connection to the headset and the per-session
//! constants: the luminance calibration table, the degrees → pixels
//! projection, the screen geometry learned at start-up, and the background
//! grey level last set on each eye.
//!
//! Every call is a serial request/response exchange.  Each I/O method takes
//! `&mut self`, so two exchanges can never interleave on the wire.  A
//! transport failure part-way through an exchange leaves the stream at an
//! unknown position, so the session drops its connection and every later
//! call returns [`OpiError::SessionClosed`].
//!
//! # Exchanges
//!
//! ```text
//! initialise:     OPI_GET_RES                 → 4×i32 LE + '\n'
//! image upload:   OPI_IMAGE w h               → READY, w×h×3 bytes → OK
//! present:        <image upload>
//!                 OPI_MONO_PRESENT e x y d rw → u8 seen, f32 LE time, '\n'
//! background:     OPI_MONO_SET_BG e grey      → OK
//!                 <image upload>
//!                 OPI_MONO_BG_ADD e cx cy     → OK
//! close:          OPI_CLOSE                   → OK
//! ```

mod link;

pub use link::DeviceLink;

use std::time::Duration;

use async_trait::async_trait;
use opi_core::protocol::codec::{GET_RES_REPLY_LEN, PRESENT_REPLY_LEN};
use opi_core::{
    DegreesToPixels, DeviceCommand, Eye, Fixation, FixationPlan, LuminanceTable, PresentReply,
    Reply, RgbImage, ScreenGeometry, StaticStimulus, Stimulus, StimulusPlan,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::opi::{
    BackgroundRequest, DeviceSnapshot, OpiError, OpiMachine, PresentResponse,
};
use crate::infrastructure::config::DeviceConfig;

/// Background grey level last set on each eye.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EyeBackgrounds {
    left: Option<u8>,
    right: Option<u8>,
}

impl EyeBackgrounds {
    fn get(&self, eye: Eye) -> Option<u8> {
        match eye {
            Eye::Left => self.left,
            Eye::Right => self.right,
        }
    }

    fn set(&mut self, eye: Eye, grey: u8) {
        match eye {
            Eye::Left => self.left = Some(grey),
            Eye::Right => self.right = Some(grey),
        }
    }
}

/// An open session with a Daydream headset.
///
/// Generic over the byte stream so tests can drive it with scripted streams;
/// production sessions use [`TcpStream`].
pub struct DeviceSession<S = TcpStream> {
    id: Uuid,
    address: Option<String>,
    /// `None` once the session has been closed or its connection failed.
    link: Option<DeviceLink<S>>,
    io_timeout: Duration,
    lut: LuminanceTable,
    projection: Box<dyn DegreesToPixels>,
    geometry: ScreenGeometry,
    backgrounds: EyeBackgrounds,
}

impl DeviceSession<TcpStream> {
    /// Connects to the headset described by `config` and reads its screen
    /// geometry.
    ///
    /// A throw-away probe connection is made first under the short probe
    /// timeout so an absent device is reported quickly; the operational
    /// connection is then opened under the I/O timeout.
    ///
    /// # Errors
    ///
    /// Returns [`OpiError::Unreachable`] when nothing accepts the connection,
    /// and any handshake error from [`DeviceSession::handshake`].
    pub async fn initialise(
        config: &DeviceConfig,
        lut: LuminanceTable,
        projection: Box<dyn DegreesToPixels>,
    ) -> Result<Self, OpiError> {
        let addr = config.address();

        info!("probing daydream at {addr}");
        let probe = connect(&addr, config.probe_timeout()).await?;
        drop(probe);

        let stream = connect(&addr, config.io_timeout()).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle on {addr}: {e}");
        }

        let mut session = Self::handshake(stream, config.io_timeout(), lut, projection).await?;
        session.address = Some(addr);
        Ok(session)
    }
}

impl<S> DeviceSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts a session over an already-open stream by sending
    /// `OPI_GET_RES` and decoding the 17-byte geometry reply.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the exchange fails, or
    /// [`OpiError::Protocol`] for a malformed geometry record.
    pub async fn handshake(
        stream: S,
        io_timeout: Duration,
        lut: LuminanceTable,
        projection: Box<dyn DegreesToPixels>,
    ) -> Result<Self, OpiError> {
        let id = Uuid::new_v4();
        let mut link = DeviceLink::new(stream, io_timeout);

        link.send(&DeviceCommand::GetResolution).await?;
        let record = link
            .read_record::<GET_RES_REPLY_LEN>("OPI_GET_RES")
            .await?;
        let geometry = ScreenGeometry::decode(&record)?;

        info!(
            session_id = %id,
            "daydream session open: screen {}x{}, eye {}x{}",
            geometry.width, geometry.height, geometry.eye_width, geometry.eye_height
        );

        Ok(Self {
            id,
            address: None,
            link: Some(link),
            io_timeout,
            lut,
            projection,
            geometry,
            backgrounds: EyeBackgrounds::default(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn geometry(&self) -> ScreenGeometry {
        self.geometry
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Converts a luminance in cd/m² to the device grey level.
    pub fn find_pixel_value(&self, cdm2: f64) -> u8 {
        self.lut.find_pixel_value(cdm2)
    }

    fn link(&mut self) -> Result<&mut DeviceLink<S>, OpiError> {
        self.link.as_mut().ok_or(OpiError::SessionClosed)
    }

    /// Drops the connection when `result` is a transport failure.
    fn settle<T>(&mut self, result: Result<T, OpiError>) -> Result<T, OpiError> {
        if let Err(e) = &result {
            if e.is_transport() && self.link.take().is_some() {
                warn!("connection dropped after transport failure: {e}");
            }
        }
        result
    }

    /// Uploads `image` into device memory.
    ///
    /// # Errors
    ///
    /// Returns [`OpiError::UnexpectedReply`] if the device does not answer
    /// `READY` (no payload is sent) or does not acknowledge the payload with
    /// `OK`.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub async fn load_image(&mut self, image: &RgbImage) -> Result<(), OpiError> {
        let uploaded = upload(self.link()?, image).await;
        self.settle(uploaded)
    }

    /// Shows a stimulus and returns the subject's response.
    ///
    /// `next` is accepted for OPI parity; the headset cannot prepare ahead.
    ///
    /// # Errors
    ///
    /// - [`OpiError::Unsupported`] for kinetic and temporal stimuli.
    /// - [`OpiError::Stimulus`] naming the first missing field.
    /// - [`OpiError::Plan`] when the stimulus cannot be drawn.
    /// - [`OpiError::Device`] when the device reports a fault code.
    ///
    /// None of the first three send anything to the device.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub async fn present(
        &mut self,
        stim: &Stimulus,
        next: Option<&Stimulus>,
    ) -> Result<PresentResponse, OpiError> {
        let stim = match stim {
            Stimulus::Static(s) => s,
            other => return Err(OpiError::Unsupported(other.kind())),
        };
        if next.is_some() {
            debug!("next stimulus hint ignored");
        }
        self.present_static(stim).await
    }

    async fn present_static(&mut self, stim: &StaticStimulus) -> Result<PresentResponse, OpiError> {
        let valid = stim.validate()?;
        let background = self.backgrounds.get(valid.eye).unwrap_or(0);
        let plan = StimulusPlan::for_static(&valid, &self.lut, self.projection.as_ref(), background)?;
        debug!(
            "stimulus {} cd/m2 -> grey {}, radius {} px at ({}, {})",
            valid.level, plan.grey, plan.radius_px, plan.centre.x, plan.centre.y
        );

        let exchanged = present_plan(self.link()?, &plan).await;
        let record = self.settle(exchanged)?;

        let reply = PresentReply::decode(&record)?;
        match reply.outcome() {
            Ok((seen, time)) => Ok(PresentResponse { seen, time }),
            Err(fault) => {
                warn!("device fault on present: {fault}");
                Err(OpiError::Device(fault))
            }
        }
    }

    /// Fills an eye's background with the grey level for `request.lum` and,
    /// for a cross fixation, stamps the cross at the projection of `(0, 0)`.
    ///
    /// The new background is recorded as soon as the device acknowledges
    /// `OPI_MONO_SET_BG`, even if the fixation upload then fails.
    ///
    /// # Errors
    ///
    /// Returns [`OpiError::MissingLuminance`] or
    /// [`OpiError::InvalidLuminance`] (no I/O) when `lum` is absent or not
    /// finite, [`OpiError::Plan`] (no I/O) when the fixation cannot be drawn,
    /// and [`OpiError::UnexpectedReply`] when the device refuses a step.
    #[instrument(skip_all, fields(session_id = %self.id, eye = %request.eye))]
    pub async fn set_background(&mut self, request: &BackgroundRequest) -> Result<(), OpiError> {
        let lum = request.lum.ok_or(OpiError::MissingLuminance)?;
        if !lum.is_finite() {
            return Err(OpiError::InvalidLuminance(lum));
        }
        let grey = self.lut.find_pixel_value(lum);
        debug!(
            "background {lum} cd/m2 -> grey {grey}; colour {} not used by device",
            request.color
        );

        let fixation = match request.fixation {
            Fixation::Cross => Some(FixationPlan::cross(
                request.fixation_size,
                request.fixation_color,
                grey,
                self.projection.as_ref(),
            )?),
            Fixation::None => None,
        };

        let eye = request.eye;
        let filled = fill_background(self.link()?, eye, grey).await;
        self.settle(filled)?;
        self.backgrounds.set(eye, grey);

        if let Some(plan) = fixation {
            let stamped = stamp_fixation(self.link()?, eye, &plan).await;
            self.settle(stamped)?;
        }

        info!("background set to grey {grey}");
        Ok(())
    }

    /// Snapshot of the session state.
    pub fn query_device(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            session_id: self.id,
            address: self.address.clone(),
            connected: self.link.is_some(),
            byte_order: "little",
            io_timeout_secs: self.io_timeout.as_secs_f64(),
            lut: self.lut.values().to_vec(),
            degrees_to_pixels: self.projection.describe(),
            geometry: self.geometry,
            background_left: self.backgrounds.left,
            background_right: self.backgrounds.right,
        }
    }

    /// Sends `OPI_CLOSE` and shuts the socket down whatever the reply.
    ///
    /// # Errors
    ///
    /// Returns [`OpiError::SessionClosed`] if already closed, and
    /// [`OpiError::UnexpectedReply`] if the device did not answer `OK` (the
    /// session is closed either way).
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub async fn close(&mut self) -> Result<(), OpiError> {
        let mut link = self.link.take().ok_or(OpiError::SessionClosed)?;
        let reply = say_goodbye(&mut link).await;
        if let Err(e) = link.shutdown().await {
            debug!("socket shutdown after close: {e}");
        }

        match reply? {
            Reply::Ok => {
                info!("daydream session closed");
                Ok(())
            }
            got => {
                warn!("OPI_CLOSE: device replied {got}");
                Err(OpiError::UnexpectedReply {
                    command: "OPI_CLOSE",
                    expected: Reply::Ok,
                    got,
                })
            }
        }
    }
}

#[async_trait]
impl<S> OpiMachine for DeviceSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn present(
        &mut self,
        stim: &Stimulus,
        next: Option<&Stimulus>,
    ) -> Result<PresentResponse, OpiError> {
        DeviceSession::present(self, stim, next).await
    }

    async fn set_background(&mut self, request: &BackgroundRequest) -> Result<(), OpiError> {
        DeviceSession::set_background(self, request).await
    }

    fn query_device(&self) -> DeviceSnapshot {
        DeviceSession::query_device(self)
    }

    async fn close(&mut self) -> Result<(), OpiError> {
        DeviceSession::close(self).await
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn connect(addr: &str, limit: Duration) -> Result<TcpStream, OpiError> {
    match time::timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            warn!("cannot connect to {addr}: {e}");
            Err(OpiError::Unreachable {
                addr: addr.to_string(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            warn!("no answer from {addr} within {limit:?}");
            Err(OpiError::Unreachable {
                addr: addr.to_string(),
                reason: format!("no answer within {limit:?}"),
            })
        }
    }
}

/// `OPI_IMAGE w h` → `READY` → payload → `OK`.
async fn upload<S>(link: &mut DeviceLink<S>, image: &RgbImage) -> Result<(), OpiError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    link.send(&DeviceCommand::Image {
        width: image.width(),
        height: image.height(),
    })
    .await?;
    link.expect("OPI_IMAGE", Reply::Ready).await?;
    link.write_payload(image.as_bytes()).await?;
    link.expect("OPI_IMAGE", Reply::Ok).await
}

/// Uploads the stimulus image, then `OPI_MONO_PRESENT` → 6-byte record.
async fn present_plan<S>(
    link: &mut DeviceLink<S>,
    plan: &StimulusPlan,
) -> Result<[u8; PRESENT_REPLY_LEN], OpiError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    upload(link, &plan.image).await?;
    link.send(&DeviceCommand::MonoPresent {
        eye: plan.eye,
        at: plan.centre,
        duration: plan.duration,
        response_window: plan.response_window,
    })
    .await?;
    link.read_record::<PRESENT_REPLY_LEN>("OPI_MONO_PRESENT")
        .await
}

async fn fill_background<S>(link: &mut DeviceLink<S>, eye: Eye, grey: u8) -> Result<(), OpiError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    link.send(&DeviceCommand::MonoSetBackground { eye, grey })
        .await?;
    link.expect("OPI_MONO_SET_BG", Reply::Ok).await
}

/// Uploads the fixation image, then `OPI_MONO_BG_ADD` at its centre.
async fn stamp_fixation<S>(
    link: &mut DeviceLink<S>,
    eye: Eye,
    plan: &FixationPlan,
) -> Result<(), OpiError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    upload(link, &plan.image).await?;
    link.send(&DeviceCommand::MonoBackgroundAdd {
        eye,
        at: plan.centre,
    })
    .await?;
    link.expect("OPI_MONO_BG_ADD", Reply::Ok).await
}

async fn say_goodbye<S>(link: &mut DeviceLink<S>) -> Result<Reply, OpiError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    link.send(&DeviceCommand::Close).await?;
    link.read_reply("OPI_CLOSE").await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
