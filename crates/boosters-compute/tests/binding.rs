//! Binding construction, introspection and teardown.

mod common;

use boosters_compute::{
    Backend, BinSums, BoostingBinSumsRequest, ComputeError, ConfigError, FloatWidth, Link, NumericConfig,
    ObjectiveBinding, UIntWidth,
};
use common::{f32_config, f64_config};
use rstest::rstest;

fn objective_string(name: &str) -> String {
    if name == "tweedie_deviance" {
        format!("{name}:variance_power=1.5")
    } else {
        name.to_string()
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn every_objective_binds_twice() {
    for name in ObjectiveBinding::objective_names() {
        for _ in 0..2 {
            let binding = ObjectiveBinding::create(&f64_config(1), &objective_string(name), Backend::Scalar)
                .unwrap();
            assert_eq!(binding.objective(), name);
            drop(binding);
        }
    }
}

#[rstest]
#[case(Backend::Scalar, 1)]
#[case(Backend::Simd128, 4)]
#[case(Backend::Simd256, 8)]
fn lane_widths(#[case] backend: Backend, #[case] lanes: usize) {
    let binding = ObjectiveBinding::create(&f32_config(2), "log_loss", backend).unwrap();
    assert_eq!(binding.lane_width(), lanes);
    assert_eq!(binding.scratch_len(), 2 * lanes);
    assert_eq!(binding.n_outputs(), 2);
    assert_eq!(binding.info().link, Link::Mlogit);
}

#[test]
fn objective_parameters_are_applied() {
    let binding = ObjectiveBinding::create(&f64_config(1), "pseudo_huber:delta=2.5", Backend::Scalar).unwrap();
    assert_eq!(binding.info().link_param, 2.5);
    let binding =
        ObjectiveBinding::create(&f64_config(1), "Tweedie_Deviance: variance_power = 1.2", Backend::Scalar)
            .unwrap();
    assert_eq!(binding.objective(), "tweedie_deviance");
}

#[test]
fn construction_failures() {
    let one = f64_config(1);
    assert!(matches!(
        ObjectiveBinding::create(&one, "hinge", Backend::Scalar),
        Err(ComputeError::UnknownObjective(name)) if name == "hinge"
    ));
    assert!(matches!(
        ObjectiveBinding::create(&one, "rmse:delta=1", Backend::Scalar),
        Err(ComputeError::InvalidObjectiveParam { .. })
    ));
    assert!(matches!(
        ObjectiveBinding::create(&f64_config(3), "poisson_deviance", Backend::Scalar),
        Err(ComputeError::UnsupportedOutputs { n_outputs: 3, .. })
    ));
    assert!(matches!(
        ObjectiveBinding::create(&one, "rmse", Backend::Simd128),
        Err(ComputeError::UnsupportedCombination { .. })
    ));

    let zero = NumericConfig {
        n_outputs: 0,
        ..NumericConfig::default()
    };
    assert_eq!(
        ObjectiveBinding::create(&zero, "rmse", Backend::Scalar).unwrap_err(),
        ComputeError::Config(ConfigError::InvalidOutputs(0))
    );
}

#[cfg(not(feature = "cuda"))]
#[test]
fn cuda_is_unavailable_without_the_feature() {
    assert_eq!(
        ObjectiveBinding::create(&f32_config(1), "rmse", Backend::Cuda).unwrap_err(),
        ComputeError::BackendUnavailable(Backend::Cuda)
    );
}

#[test]
fn differential_privacy_rejects_hessian_requests() {
    let config = NumericConfig::builder().differential_privacy(true).build().unwrap();
    let binding = ObjectiveBinding::create(&config, "log_loss", Backend::Scalar).unwrap();
    assert!(!binding.info().has_hessian);

    let gh = [0.5, 0.25];
    let mut bins = BinSums::<f64>::new(1, 1, true);
    let mut request = BoostingBinSumsRequest::builder()
        .hessian(true)
        .n_samples(1)
        .grad_hess(&gh[..])
        .bins(bins.as_mut())
        .build();
    assert_eq!(binding.bin_sums_boosting(&mut request), Err(ComputeError::HessianUnavailable));
    drop(request);
    assert_eq!(bins.total_count(), 0);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn config_from_json_drives_a_binding() {
    let json = r#"{
        "n_outputs": 3,
        "float_width": "f32",
        "uint_width": "u32"
    }"#;
    let config: NumericConfig = serde_json::from_str(json).unwrap();
    let binding = ObjectiveBinding::create(&config, "log_loss", Backend::Auto).unwrap();
    assert!(matches!(binding.backend(), Backend::Simd128 | Backend::Simd256));
    assert_eq!(binding.float_bytes(), 4);
    assert_eq!(binding.uint_bytes(), 4);
    assert_eq!(binding.config(), &config);

    let round_trip: NumericConfig = serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
    assert_eq!(round_trip, config);
}

#[test]
fn backend_names_in_json() {
    let backend: Backend = serde_json::from_str(r#""simd256""#).unwrap();
    assert_eq!(backend, Backend::Simd256);
    assert_eq!(backend.to_string(), "simd256");
    let widths: (FloatWidth, UIntWidth) = serde_json::from_str(r#"["f64", "u64"]"#).unwrap();
    assert_eq!(widths, (FloatWidth::F64, UIntWidth::U64));
}
