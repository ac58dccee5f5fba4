//! PresentSeriesUseCase: runs a fixed list of stimuli through an OPI machine.
//!
//! Each presentation produces one [`PresentRecord`] in the OPI
//! `{err, seen, time}` shape.  Refusals (validation errors, device faults,
//! unexpected replies) are recorded and the series moves on.  Transport
//! failures abort the series, because every later present would fail the
//! same way.

use opi_core::Stimulus;
use serde::Serialize;
use tracing::{info, warn};

use crate::application::opi::{OpiError, OpiMachine};

/// Outcome of one presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentRecord {
    /// Position in the series, starting at 0.
    pub index: usize,
    pub err: Option<String>,
    pub seen: Option<bool>,
    pub time: Option<f64>,
}

/// Presents stimuli one after another on a borrowed machine.
pub struct PresentSeriesUseCase<'m, M: ?Sized> {
    machine: &'m mut M,
}

impl<'m, M: OpiMachine + ?Sized> PresentSeriesUseCase<'m, M> {
    pub fn new(machine: &'m mut M) -> Self {
        Self { machine }
    }

    /// Presents every stimulus in order, passing the following one as the
    /// `next` hint.
    ///
    /// # Errors
    ///
    /// Returns the first transport error; records gathered up to that point
    /// are logged but not returned.
    pub async fn run(&mut self, stimuli: &[Stimulus]) -> Result<Vec<PresentRecord>, OpiError> {
        let mut records = Vec::with_capacity(stimuli.len());
        for (index, stim) in stimuli.iter().enumerate() {
            let next = stimuli.get(index + 1);
            let record = match self.machine.present(stim, next).await {
                Ok(response) => PresentRecord {
                    index,
                    err: None,
                    seen: Some(response.seen),
                    time: Some(response.time),
                },
                Err(e) if e.is_transport() => {
                    warn!(
                        "series aborted at stimulus {index} after {} presentations: {e}",
                        records.len()
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!("stimulus {index} refused: {e}");
                    PresentRecord {
                        index,
                        err: Some(e.to_string()),
                        seen: None,
                        time: None,
                    }
                }
            };
            records.push(record);
        }
        info!("series finished: {} presentations", records.len());
        Ok(records)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::application::opi::{BackgroundRequest, DeviceSnapshot, PresentResponse};
    use async_trait::async_trait;
    use opi_core::{DeviceFault, Eye, ScreenGeometry, StaticStimulus};
    use uuid::Uuid;

    /// Replays scripted present results and records the `next` hints seen.
    #[derive(Default)]
    struct ScriptedMachine {
        results: VecDeque<Result<PresentResponse, OpiError>>,
        next_hints: Vec<Option<Stimulus>>,
    }

    #[async_trait]
    impl OpiMachine for ScriptedMachine {
        async fn present(
            &mut self,
            _stim: &Stimulus,
            next: Option<&Stimulus>,
        ) -> Result<PresentResponse, OpiError> {
            self.next_hints.push(next.cloned());
            self.results
                .pop_front()
                .unwrap_or(Err(OpiError::SessionClosed))
        }

        async fn set_background(&mut self, _request: &BackgroundRequest) -> Result<(), OpiError> {
            Ok(())
        }

        fn query_device(&self) -> DeviceSnapshot {
            DeviceSnapshot {
                session_id: Uuid::nil(),
                address: None,
                connected: true,
                byte_order: "little",
                io_timeout_secs: 1.0,
                lut: Vec::new(),
                degrees_to_pixels: "scripted".to_string(),
                geometry: ScreenGeometry::default(),
                background_left: None,
                background_right: None,
            }
        }

        async fn close(&mut self) -> Result<(), OpiError> {
            Ok(())
        }
    }

    fn stimuli(n: usize) -> Vec<Stimulus> {
        (0..n)
            .map(|i| {
                StaticStimulus::new(Eye::Left, i as f64, 0.0, 0.43, 100.0, 200.0, 1500.0).into()
            })
            .collect()
    }

    fn seen(time: f64) -> Result<PresentResponse, OpiError> {
        Ok(PresentResponse { seen: true, time })
    }

    #[tokio::test]
    async fn test_run_records_every_response() {
        // Arrange
        let mut machine = ScriptedMachine {
            results: VecDeque::from([seen(300.0), seen(410.0)]),
            ..Default::default()
        };

        // Act
        let records = PresentSeriesUseCase::new(&mut machine)
            .run(&stimuli(2))
            .await
            .expect("series");

        // Assert
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seen, Some(true));
        assert_eq!(records[1].time, Some(410.0));
        assert!(records.iter().all(|r| r.err.is_none()));
    }

    #[tokio::test]
    async fn test_run_passes_following_stimulus_as_next_hint() {
        let list = stimuli(3);
        let mut machine = ScriptedMachine {
            results: VecDeque::from([seen(1.0), seen(2.0), seen(3.0)]),
            ..Default::default()
        };

        PresentSeriesUseCase::new(&mut machine)
            .run(&list)
            .await
            .expect("series");

        assert_eq!(machine.next_hints[0].as_ref(), Some(&list[1]));
        assert_eq!(machine.next_hints[1].as_ref(), Some(&list[2]));
        assert_eq!(machine.next_hints[2], None);
    }

    #[tokio::test]
    async fn test_run_records_device_fault_and_continues() {
        // Arrange
        let mut machine = ScriptedMachine {
            results: VecDeque::from([
                Err(OpiError::Device(DeviceFault::LocationOutOfRange)),
                seen(250.0),
            ]),
            ..Default::default()
        };

        // Act
        let records = PresentSeriesUseCase::new(&mut machine)
            .run(&stimuli(2))
            .await
            .expect("series");

        // Assert
        assert_eq!(
            records[0].err.as_deref(),
            Some("Location out of range for daydream")
        );
        assert_eq!(records[0].seen, None);
        assert_eq!(records[1].seen, Some(true));
    }

    #[tokio::test]
    async fn test_run_aborts_on_transport_error() {
        let mut machine = ScriptedMachine {
            results: VecDeque::from([seen(250.0), Err(OpiError::ConnectionClosed), seen(1.0)]),
            ..Default::default()
        };

        let result = PresentSeriesUseCase::new(&mut machine).run(&stimuli(3)).await;

        assert!(matches!(result, Err(OpiError::ConnectionClosed)));
        assert_eq!(machine.next_hints.len(), 2, "third stimulus must not be presented");
    }

    #[tokio::test]
    async fn test_run_with_no_stimuli_returns_empty() {
        let mut machine = ScriptedMachine::default();
        let records = PresentSeriesUseCase::new(&mut machine)
            .run(&[])
            .await
            .expect("series");
        assert!(records.is_empty());
    }
}
