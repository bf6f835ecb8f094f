//! Objective registry and zone factory.
//!
//! Objectives are looked up by name in a static table. Each entry
//! resolves parameters, constructs the objective and hands it to
//! [`instantiate_zone`], which monomorphizes it for the chosen backend.

use super::{ComputeZone, CpuZone};
use crate::config::{Backend, FloatWidth, NumericConfig, UIntWidth};
use crate::error::{ComputeError, Result};
use crate::lanes::{ScalarF32, ScalarF64, Simd128F32, Simd256F32};
use crate::objectives::{
    GammaLoss, LogisticLoss, Objective, ObjectiveInfo, ObjectiveSpec, PoissonLoss, PseudoHuberLoss,
    RegisteredObjective, SoftmaxLoss, SquaredLoss, TweedieLoss,
};

/// A constructed zone with the scalar parameters copied out of its objective.
pub(crate) struct Instance {
    pub zone: Box<dyn ComputeZone>,
    pub info: ObjectiveInfo,
    pub name: &'static str,
}

type Factory = fn(&ObjectiveSpec, &NumericConfig, Backend) -> Result<Instance>;

struct Registration {
    name: &'static str,
    build: Factory,
}

static REGISTRY: &[Registration] = &[
    Registration {
        name: SquaredLoss::NAME,
        build: build::<SquaredLoss>,
    },
    Registration {
        name: LogisticLoss::NAME,
        build: log_loss,
    },
    Registration {
        name: PoissonLoss::NAME,
        build: build::<PoissonLoss>,
    },
    Registration {
        name: GammaLoss::NAME,
        build: build::<GammaLoss>,
    },
    Registration {
        name: TweedieLoss::NAME,
        build: build::<TweedieLoss>,
    },
    Registration {
        name: PseudoHuberLoss::NAME,
        build: build::<PseudoHuberLoss>,
    },
];

/// Names accepted by [`ObjectiveBinding::create`](crate::ObjectiveBinding::create).
pub(crate) fn objective_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|r| r.name)
}

/// Look up, construct and instantiate an objective. `backend` must be resolved.
pub(crate) fn instantiate(spec: &ObjectiveSpec, config: &NumericConfig, backend: Backend) -> Result<Instance> {
    let registration = REGISTRY
        .iter()
        .find(|r| r.name == spec.name)
        .ok_or_else(|| ComputeError::UnknownObjective(spec.name.clone()))?;
    (registration.build)(spec, config, backend)
}

fn build<O: RegisteredObjective>(spec: &ObjectiveSpec, config: &NumericConfig, backend: Backend) -> Result<Instance> {
    let params = spec.resolve(O::PARAMS)?;
    let objective = O::from_params(&params, config)?;
    let mut info = objective.info();
    if config.differential_privacy {
        info.has_hessian = false;
    }
    let zone = instantiate_zone(objective, config, backend)?;
    Ok(Instance {
        zone,
        info,
        name: O::NAME,
    })
}

/// `log_loss` is binary with one output and softmax with several.
fn log_loss(spec: &ObjectiveSpec, config: &NumericConfig, backend: Backend) -> Result<Instance> {
    if config.n_outputs == 1 {
        build::<LogisticLoss>(spec, config, backend)
    } else {
        build::<SoftmaxLoss>(spec, config, backend)
    }
}

fn instantiate_zone<O: Objective>(
    objective: O,
    config: &NumericConfig,
    backend: Backend,
) -> Result<Box<dyn ComputeZone>> {
    use FloatWidth::{F32, F64};
    use UIntWidth::{U32, U64};

    let zone: Box<dyn ComputeZone> = match (backend, config.float_width, config.uint_width) {
        (Backend::Scalar, F64, U64) => Box::new(CpuZone::<ScalarF64, O>::new(objective)),
        (Backend::Scalar, F32, U32) => Box::new(CpuZone::<ScalarF32, O>::new(objective)),
        (Backend::Simd128, F32, U32) => Box::new(CpuZone::<Simd128F32, O>::new(objective)),
        (Backend::Simd256, F32, U32) => simd256_zone(objective),
        #[cfg(feature = "cuda")]
        (Backend::Cuda, F32, U32) => Box::new(super::cuda::CudaZone::new(objective)?),
        #[cfg(not(feature = "cuda"))]
        (Backend::Cuda, _, _) => return Err(ComputeError::BackendUnavailable(Backend::Cuda)),
        (backend, float_width, uint_width) => {
            return Err(ComputeError::UnsupportedCombination {
                backend,
                float_width,
                uint_width,
            })
        }
    };
    Ok(zone)
}

/// The AVX2 zone when the CPU has it, the portable 256-bit build otherwise.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn simd256_zone<O: Objective>(objective: O) -> Box<dyn ComputeZone> {
    match super::avx2::Avx2Zone::new(objective) {
        Ok(zone) => Box::new(zone),
        Err(objective) => {
            log::debug!("avx2 not detected, simd256 runs the portable build");
            Box::new(CpuZone::<Simd256F32, O>::new(objective))
        }
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn simd256_zone<O: Objective>(objective: O) -> Box<dyn ComputeZone> {
    Box::new(CpuZone::<Simd256F32, O>::new(objective))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n_outputs: usize, dp: bool) -> NumericConfig {
        NumericConfig::builder()
            .n_outputs(n_outputs)
            .differential_privacy(dp)
            .build()
            .unwrap()
    }

    fn create(objective: &str, config: &NumericConfig) -> Result<Instance> {
        instantiate(&ObjectiveSpec::parse(objective)?, config, Backend::Scalar)
    }

    #[test]
    fn every_registered_name_instantiates() {
        for name in objective_names() {
            let objective = if name == TweedieLoss::NAME {
                format!("{name}:variance_power=1.5")
            } else {
                name.to_string()
            };
            let instance = create(&objective, &config(1, false)).unwrap();
            assert_eq!(instance.name, name);
            assert_eq!(instance.zone.lane_width(), 1);
        }
    }

    #[test]
    fn log_loss_picks_by_outputs() {
        let binary = create("log_loss", &config(1, false)).unwrap();
        assert_eq!(binary.info.link, crate::Link::Logit);
        let multi = create("log_loss", &config(4, false)).unwrap();
        assert_eq!(multi.info.link, crate::Link::Mlogit);
    }

    #[test]
    fn derivative_constants_follow_the_objective() {
        let one = config(1, false);
        for name in ["rmse", "poisson_deviance", "gamma_deviance", "tweedie_deviance:variance_power=1.3"] {
            let info = create(name, &one).unwrap().info;
            assert_eq!((info.gradient_constant, info.hessian_constant), (2.0, 2.0), "{name}");
        }
        for (name, outputs) in [("log_loss", 1), ("log_loss", 3), ("pseudo_huber", 1)] {
            let info = create(name, &config(outputs, false)).unwrap().info;
            assert_eq!((info.gradient_constant, info.hessian_constant), (1.0, 1.0), "{name}");
        }
    }

    #[test]
    fn differential_privacy_drops_hessian() {
        assert!(create("poisson_deviance", &config(1, false)).unwrap().info.has_hessian);
        assert!(!create("poisson_deviance", &config(1, true)).unwrap().info.has_hessian);
    }

    #[test]
    fn construction_errors() {
        let one = config(1, false);
        assert!(matches!(create("hinge", &one), Err(ComputeError::UnknownObjective(_))));
        assert!(matches!(
            create("tweedie_deviance", &one),
            Err(ComputeError::InvalidObjectiveParam { .. })
        ));
        assert!(matches!(
            create("tweedie_deviance:variance_power=3", &one),
            Err(ComputeError::InvalidObjectiveParam { .. })
        ));
        assert!(matches!(
            create("rmse", &config(2, false)),
            Err(ComputeError::UnsupportedOutputs { .. })
        ));
    }

    #[test]
    fn backend_width_combinations() {
        let f64_u32 = NumericConfig::builder().uint_width(UIntWidth::U32).build().unwrap();
        let spec = ObjectiveSpec::parse("rmse").unwrap();
        assert!(matches!(
            instantiate(&spec, &f64_u32, Backend::Scalar),
            Err(ComputeError::UnsupportedCombination { .. })
        ));
        assert!(matches!(
            instantiate(&spec, &NumericConfig::default(), Backend::Simd256),
            Err(ComputeError::UnsupportedCombination { .. })
        ));
        let f32_u32 = NumericConfig::builder()
            .float_width(FloatWidth::F32)
            .uint_width(UIntWidth::U32)
            .build()
            .unwrap();
        let wide = instantiate(&spec, &f32_u32, Backend::Simd256).unwrap();
        assert_eq!(wide.zone.lane_width(), 8);
        #[cfg(not(feature = "cuda"))]
        assert!(matches!(
            instantiate(&spec, &NumericConfig::default(), Backend::Cuda),
            Err(ComputeError::BackendUnavailable(Backend::Cuda))
        ));
    }
}
