use approx::relative_eq;
use proptest::prelude::*;
use tbreco_core::{
    calibrate, calibrate_all, CalibrationTable, HitBuilder, PulseFit, PulseFitter,
    RawChannelSample, ReconstructedHit, Timestamp, N_SAMPLES,
};

const CHANNELS: usize = 8;

struct EchoFitter {
    amplitude: f64,
    amplitude_error: f64,
    noise: f64,
}

impl PulseFitter for EchoFitter {
    fn name(&self) -> &'static str {
        "Echo"
    }

    fn fit(&self, sample: &RawChannelSample) -> PulseFit {
        PulseFit {
            pedestal: sample.pedestal,
            noise: self.noise,
            amplitude: self.amplitude,
            amplitude_error: self.amplitude_error,
            rise_time: 5.0,
            rise_time_error: 0.1,
            chi2: 20.0,
            ndof: 10,
            status: 0,
        }
    }
}

fn fitted_hit(channel: i32, amplitude: f64, amplitude_error: f64, noise: f64) -> ReconstructedHit {
    let sample = RawChannelSample::new(
        channel,
        112,
        0,
        vec![100; N_SAMPLES],
        4000,
        100.0,
        1.0,
        Timestamp(1),
    )
    .unwrap();
    let builder = HitBuilder::new(EchoFitter {
        amplitude,
        amplitude_error,
        noise,
    });
    builder.build(Some(&sample), 3.0, false)
}

fn close(a: f64, b: f64) -> bool {
    relative_eq!(a, b, epsilon = 1e-9, max_relative = 1e-12)
}

fn table() -> impl Strategy<Value = CalibrationTable> {
    prop::collection::vec(0.05f64..20.0, CHANNELS)
        .prop_map(|factors| CalibrationTable::new(factors).unwrap())
}

proptest! {
    #[test]
    fn calibrating_twice_equals_once(
        channel in 0..CHANNELS as i32,
        amplitude in -500.0f64..5000.0,
        amplitude_error in 0.0f64..50.0,
        noise in 0.0f64..30.0,
        t in table(),
    ) {
        let mut once = fitted_hit(channel, amplitude, amplitude_error, noise);
        calibrate(&mut once, &t).unwrap();

        let mut twice = once.clone();
        calibrate(&mut twice, &t).unwrap();

        prop_assert!(close(twice.amplitude(), once.amplitude()));
        prop_assert!(close(twice.amplitude_error(), once.amplitude_error()));
        prop_assert!(close(twice.noise(), once.noise()));
        prop_assert!(close(twice.calibration_factor(), once.calibration_factor()));
    }

    #[test]
    fn recalibration_matches_direct_calibration(
        channel in 0..CHANNELS as i32,
        amplitude in -500.0f64..5000.0,
        amplitude_error in 0.0f64..50.0,
        noise in 0.0f64..30.0,
        t1 in table(),
        t2 in table(),
    ) {
        let raw = fitted_hit(channel, amplitude, amplitude_error, noise);

        let mut via_t1 = raw.clone();
        calibrate(&mut via_t1, &t1).unwrap();
        calibrate(&mut via_t1, &t2).unwrap();

        let mut direct = raw;
        calibrate(&mut direct, &t2).unwrap();

        prop_assert!(close(via_t1.amplitude(), direct.amplitude()));
        prop_assert!(close(via_t1.amplitude_error(), direct.amplitude_error()));
        prop_assert!(close(via_t1.noise(), direct.noise()));
        prop_assert!(close(via_t1.calibration_factor(), direct.calibration_factor()));
    }

    #[test]
    fn batch_calibration_matches_single(
        amplitudes in prop::collection::vec(0.0f64..4000.0, 1..20),
        t in table(),
    ) {
        let hits: Vec<ReconstructedHit> = amplitudes
            .iter()
            .enumerate()
            .map(|(i, &a)| fitted_hit((i % CHANNELS) as i32, a, 1.0, 2.0))
            .collect();

        let mut batch = hits.clone();
        calibrate_all(&mut batch, &t).unwrap();

        for (single, batched) in hits.into_iter().zip(&batch) {
            let mut single = single;
            calibrate(&mut single, &t).unwrap();
            prop_assert_eq!(&single, batched);
        }
    }
}

#[test]
fn uncalibrated_factor_is_identity() {
    let hit = fitted_hit(0, 100.0, 1.0, 2.0);
    assert!(!hit.is_calibrated());
    assert!((hit.calibration_factor() - 1.0).abs() < f64::EPSILON);
}
