use std::ops::ControlFlow;

use gridworld_rl::history::EpisodeRecord;
use gridworld_rl::{
    Env, EnvConfig, Grid, LearningParams, Movement, Pos, QLearning, TransitionProbabilities,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const CLASSIC: &str = "FFFE\nFOFP\nFFFF";

fn env(text: &str, transition_probabilities: TransitionProbabilities) -> Env {
    let config = EnvConfig {
        transition_probabilities,
        ..EnvConfig::default()
    };
    Env::new(Grid::parse(text).unwrap(), &config).unwrap()
}

#[test]
fn straight_moves_never_slip() {
    let env = env(CLASSIC, TransitionProbabilities::deterministic());
    let mut rng = StdRng::seed_from_u64(42);
    for &s in env.states() {
        for &a in env.actions() {
            let expected = match s.offset(a) {
                Some(target) if env.is_valid(target) => target,
                _ => s,
            };
            for _ in 0..10 {
                let (reward, next) = env.transition(s, a, &mut rng).unwrap();
                assert_eq!(next, expected, "{} {}", s, a);
                assert_eq!(Some(reward), env.reward(s));
            }
        }
    }
}

#[test]
fn obstacle_is_never_a_state() {
    let env = env(CLASSIC, TransitionProbabilities::default());
    assert!(!env.states().contains(&Pos::new(1, 1)));
    let mut rng = StdRng::seed_from_u64(5);
    // Walking into the obstacle from every side bounces back.
    for (s, a) in [
        (Pos::new(1, 0), Movement::DOWN),
        (Pos::new(0, 1), Movement::RIGHT),
        (Pos::new(2, 1), Movement::LEFT),
        (Pos::new(1, 2), Movement::UP),
    ] {
        for _ in 0..50 {
            let (_, next) = env.transition(s, a, &mut rng).unwrap();
            assert_ne!(next, Pos::new(1, 1));
        }
    }
}

#[test]
fn deterministic_corridor_reaches_bellman_fixed_point() {
    let env = env("FFE", TransitionProbabilities::deterministic());
    let params = LearningParams {
        discount_factor: 1.0,
        learning_rate: 0.5,
        epsilon: 0.0,
        decimal_places: 5,
        ..LearningParams::default()
    };
    let mut learner = QLearning::new(env, params, StdRng::seed_from_u64(0)).unwrap();
    for _ in 0..300 {
        learner.episode_from(Pos::new(0, 0)).unwrap();
    }

    // Q*(s0, right) = r(s0) + r(s1) + r(E) = -0.04 - 0.04 + 1
    let q0 = learner.q_value(Pos::new(0, 0), Movement::RIGHT).unwrap();
    let q1 = learner.q_value(Pos::new(1, 0), Movement::RIGHT).unwrap();
    assert!((q0 - 0.92).abs() < 1e-3, "Q(s0, right) = {}", q0);
    assert!((q1 - 0.96).abs() < 1e-3, "Q(s1, right) = {}", q1);
    assert_eq!(learner.policy_action(Pos::new(0, 0)), Some(Movement::RIGHT));
    assert_eq!(learner.policy_action(Pos::new(1, 0)), Some(Movement::RIGHT));
}

#[test]
fn convergence_requires_threshold_unchanged_episodes() {
    let env = env(CLASSIC, TransitionProbabilities::default());
    let params = LearningParams {
        epsilon: 0.3,
        ..LearningParams::default()
    };
    let mut learner = QLearning::new(env, params, StdRng::seed_from_u64(9)).unwrap();
    let threshold = 15;

    let mut records: Vec<EpisodeRecord> = Vec::new();
    let report = learner
        .run_until_convergence_with(threshold, |record| {
            records.push(record.clone());
            ControlFlow::Continue(())
        })
        .unwrap();

    assert!(report.converged);
    assert_eq!(report.episodes, records.len());
    let mut previous = 0;
    for record in &records[..records.len() - 1] {
        assert!(record.unchanged_streak < threshold);
        if record.policy_changed {
            assert_eq!(record.unchanged_streak, 0);
        } else {
            assert_eq!(record.unchanged_streak, previous + 1);
        }
        previous = record.unchanged_streak;
    }
    assert_eq!(records.last().unwrap().unchanged_streak, threshold);

    let after = report.converged_after().unwrap();
    assert_eq!(after, report.episodes - threshold);
    if after > 0 {
        assert!(records[after - 1].policy_changed);
    }
    assert_eq!(learner.last_convergence(), Some(report));
}

#[test]
fn converged_policy_is_stable_under_update() {
    let env = env(CLASSIC, TransitionProbabilities::default());
    let mut learner =
        QLearning::new(env, LearningParams::default(), StdRng::seed_from_u64(21)).unwrap();
    learner.run_until_convergence(10).unwrap();
    let before = learner.policy().clone();
    learner.update_policy();
    learner.update_policy();
    assert_eq!(&before, learner.policy());
}

#[test]
fn zero_threshold_is_rejected() {
    let env = env("FE", TransitionProbabilities::default());
    let mut learner =
        QLearning::new(env, LearningParams::default(), StdRng::seed_from_u64(1)).unwrap();
    assert!(learner.run_until_convergence(0).is_err());
}

#[test]
fn same_seed_same_table() {
    let run = |seed| {
        let env = env(CLASSIC, TransitionProbabilities::default());
        let mut learner =
            QLearning::new(env, LearningParams::default(), StdRng::seed_from_u64(seed)).unwrap();
        for _ in 0..50 {
            learner.episode().unwrap();
        }
        learner.format_q_function()
    };
    assert_eq!(run(77), run(77));
}
