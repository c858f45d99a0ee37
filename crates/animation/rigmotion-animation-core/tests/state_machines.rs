use rigmotion_animation_core::{
    name_hash, Animator, AnimatorCallbacks, AnimatorConfig, AnimatorEvent, ControllerDef, NameHash,
};
use rigmotion_test_fixtures::builders;

#[derive(Default)]
struct Collect {
    events: Vec<AnimatorEvent>,
}

impl AnimatorCallbacks for Collect {
    fn on_animation_event(&mut self, event: &AnimatorEvent) {
        self.events.push(event.clone());
    }
}

impl Collect {
    fn transitions(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AnimatorEvent::TransitionStarted { .. }))
            .count()
    }
}

fn generic(def: ControllerDef) -> Animator {
    let mut a = Animator::new(builders::generic_rig(), AnimatorConfig::default());
    a.bind(def.build().expect("controller builds"), builders::generic_avatar())
        .expect("generic avatar binds");
    a
}

fn humanoid() -> Animator {
    let mut a = Animator::new(builders::humanoid_rig(), AnimatorConfig::default());
    a.bind(
        builders::locomotion_controller().build().expect("controller builds"),
        builders::humanoid_avatar(),
    )
    .expect("humanoid binds");
    a
}

fn current(a: &Animator) -> NameHash {
    a.current_state_info(0).unwrap().name_hash
}

/// it should take an exit-time transition once when 0.95 s then 0.05 s cross 0.9
#[test]
fn exit_time_transition_fires_once() {
    let mut a = generic(builders::exit_time_controller(0.9));
    let mut cb = Collect::default();
    assert_eq!(current(&a), name_hash("A"));

    a.tick_with(0.95, &mut cb);
    a.tick_with(0.05, &mut cb);
    for _ in 0..20 {
        a.tick_with(0.05, &mut cb);
    }
    assert_eq!(cb.transitions(), 1);
    assert_eq!(current(&a), name_hash("B"));
}

/// it should not fire before the exit time is reached
#[test]
fn exit_time_waits_for_threshold() {
    let mut a = generic(builders::exit_time_controller(0.9));
    let mut cb = Collect::default();
    for _ in 0..7 {
        a.tick_with(0.125, &mut cb);
    }
    assert_eq!(cb.transitions(), 0);
    assert_eq!(current(&a), name_hash("A"));
    a.tick_with(0.125, &mut cb);
    assert_eq!(cb.transitions(), 1);
}

/// it should consume a trigger as soon as its transition starts
#[test]
fn trigger_is_consumed() {
    let mut a = humanoid();
    a.tick(0.016);
    a.set_trigger("Jump").unwrap();
    assert!(a.get_bool("Jump").unwrap());
    a.tick(0.016);
    assert!(!a.get_bool("Jump").unwrap());
    let next = a.next_state_info(0).unwrap().expect("jump transition running");
    assert_eq!(next.name_hash, name_hash("Jump"));
    assert!(a.transition_info(0).unwrap().unwrap().any_state);
}

/// it should keep exactly one current state and a consistent transition
#[test]
fn current_state_invariant_holds() {
    let mut a = humanoid();
    let speeds = [0.0, 0.3, 0.3, 0.8, 1.0, 0.05, 0.0, 0.6, 0.0];
    for (i, s) in speeds.iter().cycle().take(120).enumerate() {
        a.set_float("Speed", *s).unwrap();
        if i % 37 == 0 {
            a.set_trigger("Jump").unwrap();
        }
        a.tick(0.05);

        let info = a.current_state_info(0).unwrap();
        assert!(info.length >= 0.0);
        match a.transition_info(0).unwrap() {
            Some(t) => {
                assert!(a.is_in_transition(0).unwrap());
                assert!((0.0..=1.0).contains(&t.normalized_time), "{t:?}");
                let next = a.next_state_info(0).unwrap().expect("next state during transition");
                assert_eq!(next.name_hash, t.destination);
            }
            None => {
                assert!(!a.is_in_transition(0).unwrap());
                assert!(a.next_state_info(0).unwrap().is_none());
            }
        }
    }
}

/// it should answer state queries identically without a tick in between
#[test]
fn state_info_is_idempotent() {
    let mut a = humanoid();
    a.set_float("Speed", 0.5).unwrap();
    for _ in 0..3 {
        a.tick(0.05);
    }
    assert_eq!(a.current_state_info(0), a.current_state_info(0));
    assert_eq!(a.next_state_info(0), a.next_state_info(0));
    assert_eq!(a.transition_info(0), a.transition_info(0));
}

/// it should apply play and cross-fade requests at the next tick
#[test]
fn play_and_cross_fade() {
    let mut a = humanoid();
    a.set_float("Speed", 0.5).unwrap();
    a.tick(0.05);
    a.play(0, name_hash("Base.Move"), 0.5).unwrap();
    assert_eq!(current(&a), name_hash("Idle"));
    a.tick(0.0);
    let info = a.current_state_info(0).unwrap();
    assert_eq!(info.name_hash, name_hash("Move"));
    assert_eq!(info.full_path_hash, name_hash("Base.Move"));
    assert!((info.normalized_time - 0.5).abs() < 1e-5);

    a.cross_fade(0, name_hash("Idle"), 0.5, 0.0).unwrap();
    a.tick(0.1);
    let t = a.transition_info(0).unwrap().expect("cross-fade running");
    assert!(t.user);
    assert_eq!(t.destination, name_hash("Idle"));
    assert!(t.normalized_time > 0.0 && t.normalized_time < 1.0);
}

/// it should emit footsteps once per crossing while walking
#[test]
fn clip_events_follow_crossings() {
    let mut a = humanoid();
    let mut cb = Collect::default();
    a.set_float("Speed", 0.5).unwrap();
    for _ in 0..40 {
        a.tick_with(0.05, &mut cb);
    }
    let steps: Vec<&str> = cb
        .events
        .iter()
        .filter_map(|e| match e {
            AnimatorEvent::Animation { name, payload, .. } if name == "Footstep" => Some(payload.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(steps, ["left", "right", "left", "right"]);
}

/// it should keep layer 0 at full weight
#[test]
fn layer_weights() {
    let mut a = humanoid();
    a.set_layer_weight(0, 0.2).unwrap();
    assert_eq!(a.layer_weight(0).unwrap(), 1.0);
    assert_eq!(a.layer_index("Base").unwrap(), 0);
    assert_eq!(a.layer_count(), 1);
}

/// it should report the default state at time zero before the first tick
#[test]
fn state_info_before_first_tick() {
    let a = generic(builders::exit_time_controller(0.9));
    let info = a.current_state_info(0).unwrap();
    assert_eq!(info.index, 0);
    assert_eq!(info.name_hash, name_hash("A"));
    assert_eq!(info.normalized_time, 0.0);
    assert!(a.next_state_info(0).unwrap().is_none());
    assert!(a.transition_info(0).unwrap().is_none());
    assert!(!a.is_in_transition(0).unwrap());
}

/// it should take an exit-time transition while the state plays backwards
#[test]
fn exit_time_fires_in_reverse() {
    let mut def = builders::exit_time_controller(0.9);
    def.layers[0].state_machine.states[0].speed = -1.0;
    let mut a = generic(def);
    let mut cb = Collect::default();

    a.tick_with(0.05, &mut cb);
    assert_eq!(cb.transitions(), 0);
    a.tick_with(0.05, &mut cb);
    a.tick_with(0.05, &mut cb);
    assert_eq!(cb.transitions(), 1);
    for _ in 0..20 {
        a.tick_with(0.05, &mut cb);
    }
    assert_eq!(cb.transitions(), 1);
    assert_eq!(current(&a), name_hash("B"));
}
