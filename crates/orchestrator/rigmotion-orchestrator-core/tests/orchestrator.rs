use std::sync::Arc;

use glam::Vec3;
use rigmotion_animation_core::{
    Animator, AnimatorConfig, AnimatorEvent, AvatarGoal, BuildError, IkGoals, InstId, RootMotion, RootTransform,
};
use rigmotion_orchestrator::{
    AnimatorHost, ControllerLibrary, FrameEvent, NullHost, Orchestrator, OrchestratorConfig, ParallelFor,
    RayonParallel, SerialParallel,
};
use rigmotion_test_fixtures::builders;

fn library() -> Arc<ControllerLibrary> {
    let lib = ControllerLibrary::new();
    lib.register("loco", &builders::locomotion_controller()).unwrap();
    lib.register("wave", &builders::wave_controller()).unwrap();
    Arc::new(lib)
}

fn walkers(pool: Box<dyn ParallelFor>) -> (Orchestrator, Vec<InstId>) {
    let mut orch = Orchestrator::with_pool(OrchestratorConfig::default(), library(), pool);
    let ids = [0.3, 0.5, 0.9]
        .iter()
        .map(|speed| {
            let id = orch
                .spawn(builders::humanoid_rig(), "loco", builders::humanoid_avatar())
                .unwrap();
            orch.get_mut(id).unwrap().set_float("Speed", *speed).unwrap();
            id
        })
        .collect();
    (orch, ids)
}

fn waves(n: usize) -> (Orchestrator, Vec<InstId>) {
    let mut orch = Orchestrator::new(OrchestratorConfig::default(), library());
    let ids = (0..n)
        .map(|_| {
            orch.spawn(builders::generic_rig(), "wave", builders::generic_avatar())
                .unwrap()
        })
        .collect();
    (orch, ids)
}

/// it should deliver the same events in insertion order whatever the pool
#[test]
fn event_order_matches_insertion_for_every_pool() {
    let (mut parallel, ids) = walkers(Box::new(RayonParallel));
    let (mut serial, _) = walkers(Box::new(SerialParallel));

    let mut total = 0;
    for _ in 0..90 {
        let a = parallel.step(1.0 / 30.0, &mut NullHost).unwrap();
        let b = serial.step(1.0 / 30.0, &mut NullHost).unwrap();
        assert_eq!(a.events, b.events);
        assert_eq!(a.writes, b.writes);

        let order: Vec<usize> = a
            .events
            .iter()
            .map(|e| ids.iter().position(|id| *id == e.inst).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] <= w[1]), "out of order: {order:?}");
        total += a.events.len();
    }
    assert!(total > 0);

    for id in &ids {
        let p = parallel.get(*id).unwrap().root_position();
        let s = serial.get(*id).unwrap().root_position();
        assert!((p - s).length() < 1e-6);
    }
}

/// it should skip pose and property writes of invisible instances while their root keeps moving
#[test]
fn invisible_instances_skip_writes() {
    let (mut orch, ids) = waves(2);
    let (visible, hidden) = (ids[0], ids[1]);
    orch.get_mut(hidden).unwrap().set_visible(false);

    let body = orch.get(hidden).unwrap().rig().find("Body").unwrap();
    let before = orch.get(hidden).unwrap().rig().global(body).unwrap();

    for _ in 0..5 {
        let frame = orch.step(0.1, &mut NullHost).unwrap();
        assert!(frame.conflicts.is_empty());
        assert_eq!(frame.writes.len(), 2);
    }

    for (_, entry) in orch.properties().iter() {
        assert_eq!(entry.source, visible);
    }
    let after = orch.get(hidden).unwrap().rig().global(body).unwrap();
    assert_eq!(after, before);

    let moved_hidden = orch.get(hidden).unwrap().root_position();
    let moved_visible = orch.get(visible).unwrap().root_position();
    assert!(moved_hidden.z > 0.4);
    assert!((moved_hidden - moved_visible).length() < 1e-5);
}

/// it should log a conflict when two instances write the same property in one step
#[test]
fn property_conflicts_are_logged() {
    let (mut orch, ids) = waves(2);
    let frame = orch.step(0.5, &mut NullHost).unwrap();

    assert_eq!(frame.writes.len(), 4);
    assert_eq!(frame.conflicts.len(), 2);
    for c in &frame.conflicts {
        assert_eq!(c.previous_source, ids[0]);
        assert_eq!(c.new_source, ids[1]);
        assert_eq!(c.epoch, frame.epoch);
    }
    let tint = orch.properties().get_str("Body#Material.tint").unwrap();
    assert_eq!(tint.source, ids[1]);
    assert_eq!(tint.epoch, 1);
}

/// it should skip instances that were never bound
#[test]
fn uninitialized_instances_are_skipped() {
    let (mut orch, _) = waves(1);
    let idle = orch.insert(Animator::new(builders::generic_rig(), AnimatorConfig::default()));

    let frame = orch.step(0.1, &mut NullHost).unwrap();
    assert!(frame.events.iter().all(|e| e.inst != idle));
    assert!(orch.properties().iter().all(|(_, e)| e.source != idle));
    assert_eq!(orch.get(idle).unwrap().root_position(), Vec3::ZERO);
    assert_eq!(orch.len(), 2);
}

struct Reloader {
    library: Arc<ControllerLibrary>,
    results: Vec<Result<(), BuildError>>,
}

impl AnimatorHost for Reloader {
    fn on_animator_move(&mut self, _inst: InstId, _motion: &RootMotion, _root: &mut RootTransform) -> bool {
        let r = self.library.replace("wave", &builders::wave_controller()).map(|_| ());
        self.results.push(r);
        false
    }
}

/// it should refuse hot-reload during a step and rebind instances on the next one
#[test]
fn hot_reload_waits_for_the_step() {
    let (mut orch, ids) = waves(1);
    let library = Arc::clone(orch.library());
    let mut host = Reloader {
        library: Arc::clone(&library),
        results: Vec::new(),
    };

    orch.step(0.1, &mut host).unwrap();
    assert_eq!(host.results, [Err(BuildError::TickInFlight)]);
    assert!(!library.is_in_flight());

    library.replace("wave", &builders::wave_controller()).unwrap();
    assert_eq!(library.generation("wave"), Some(1));
    let fresh = library.get("wave").unwrap();
    assert!(!Arc::ptr_eq(orch.get(ids[0]).unwrap().graph().unwrap(), &fresh));

    orch.step(0.1, &mut NullHost).unwrap();
    assert!(Arc::ptr_eq(orch.get(ids[0]).unwrap().graph().unwrap(), &fresh));
}

#[derive(Default)]
struct Tracker {
    moves: Vec<InstId>,
    ik: Vec<(InstId, usize)>,
    events: Vec<FrameEvent>,
}

impl AnimatorHost for Tracker {
    fn on_animation_event(&mut self, inst: InstId, event: &AnimatorEvent) {
        self.events.push(FrameEvent {
            inst,
            event: event.clone(),
        });
    }

    fn on_animator_move(&mut self, inst: InstId, _motion: &RootMotion, _root: &mut RootTransform) -> bool {
        self.moves.push(inst);
        true
    }

    fn on_animator_ik(&mut self, inst: InstId, layer: usize, goals: &mut dyn IkGoals) {
        self.ik.push((inst, layer));
        goals.set_goal_position(AvatarGoal::LeftHand, Vec3::new(0.45, 1.35, 0.15));
        goals.set_goal_position_weight(AvatarGoal::LeftHand, 1.0);
    }
}

/// it should route callbacks per instance and let the host own root motion
#[test]
fn host_callbacks_are_tagged_with_instances() {
    let (mut orch, ids) = walkers(Box::new(RayonParallel));
    let mut host = Tracker::default();
    let mut frame_events = Vec::new();
    for _ in 0..30 {
        frame_events.extend(orch.step(1.0 / 30.0, &mut host).unwrap().events);
    }

    assert_eq!(&host.moves[..3], &ids[..]);
    assert_eq!(host.ik[..3], [(ids[0], 0), (ids[1], 0), (ids[2], 0)]);
    assert_eq!(host.events, frame_events);
    for id in &ids {
        let a = orch.get(*id).unwrap();
        assert_eq!(a.root_position(), Vec3::ZERO);
        let rig = a.rig();
        let hand = rig.nodes().iter().position(|n| n.name == "LeftHand").unwrap();
        let p = rig.global(hand).unwrap().translation;
        assert!((p - Vec3::new(0.45, 1.35, 0.15)).length() < 1e-2, "hand at {p}");
    }
}
