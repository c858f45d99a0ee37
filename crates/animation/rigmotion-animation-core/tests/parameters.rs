use rigmotion_animation_core::{name_hash, AnimatorConfig, AnimatorError, Animator, ParameterValue};
use rigmotion_test_fixtures::builders;

fn locomotion() -> Animator {
    let graph = builders::locomotion_controller().build().expect("controller builds");
    let mut animator = Animator::new(builders::humanoid_rig(), AnimatorConfig::default());
    animator
        .bind(graph, builders::humanoid_avatar())
        .expect("humanoid binds");
    animator
}

/// it should return what was just set
#[test]
fn set_then_get_round_trips() {
    let mut a = locomotion();
    a.set_float("Speed", 0.7).unwrap();
    assert_eq!(a.get_float("Speed").unwrap(), 0.7);
    a.set_bool("Grounded", false).unwrap();
    assert!(!a.get_bool("Grounded").unwrap());
    a.set_parameter("Speed", ParameterValue::Float(-2.5)).unwrap();
    assert_eq!(a.get_parameter("Speed").unwrap(), ParameterValue::Float(-2.5));
}

/// it should refuse host writes to curve-driven parameters and keep the value
#[test]
fn curve_controlled_parameter_is_read_only() {
    let mut a = locomotion();
    let before = a.get_float("GravityWeight").unwrap();
    assert_eq!(a.set_float("GravityWeight", 0.25), Err(AnimatorError::ControlledByCurve));
    assert_eq!(a.get_float("GravityWeight").unwrap(), before);
}

/// it should resolve the same slot by hash and by schema index
#[test]
fn hash_lookup_matches_index_lookup() {
    let a = locomotion();
    let schema = a.graph().unwrap().parameters().clone();
    for (i, spec) in schema.iter().enumerate() {
        assert_eq!(
            a.get_parameter(name_hash(&spec.name)).unwrap(),
            a.get_parameter(i).unwrap(),
            "parameter {}",
            spec.name
        );
    }
}

#[test]
fn usage_errors() {
    let mut a = locomotion();
    assert_eq!(a.get_float("Nope"), Err(AnimatorError::DoesNotExist));
    assert_eq!(a.set_bool("Speed", true), Err(AnimatorError::TypeMismatch));
    assert_eq!(a.set_trigger("Speed"), Err(AnimatorError::TypeMismatch));
    assert_eq!(a.get_parameter(99usize), Err(AnimatorError::DoesNotExist));
    assert_eq!(a.set_layer_weight(5, 0.5), Err(AnimatorError::InvalidIndex));
    assert_eq!(a.play(0, name_hash("Nowhere"), 0.0), Err(AnimatorError::DoesNotExist));
}

/// it should report NotInitialized for every runtime call before a bind
#[test]
fn unbound_animator_is_not_initialized() {
    let mut a = Animator::new(builders::humanoid_rig(), AnimatorConfig::default());
    assert!(!a.is_initialized());
    assert_eq!(a.get_float("Speed"), Err(AnimatorError::NotInitialized));
    assert_eq!(a.set_float("Speed", 1.0), Err(AnimatorError::NotInitialized));
    assert_eq!(a.play(0, name_hash("Idle"), 0.0), Err(AnimatorError::NotInitialized));
    assert_eq!(a.current_state_info(0), Err(AnimatorError::NotInitialized));
    // ticking an unbound animator is a no-op
    a.tick(0.1);
    assert_eq!(a.layer_count(), 0);
}
