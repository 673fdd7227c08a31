//! Broadcast schedule, urgency multiplier and warning visits.

use taxgap_core::{
    config::SimConfig,
    engine::SimEngine,
    event::SimEvent,
};

fn email_only_config() -> SimConfig {
    let mut config = SimConfig::default_test();
    config.communication.schedule = [(1, vec!["email".to_string()])].into();
    config
}

#[test]
fn urgent_week_doubles_effect_but_not_cost() {
    let mut engine = SimEngine::build("comm-urgent".into(), 42, email_only_config()).unwrap();
    let email_effect = engine.config().communication.channel_effects["email"];
    let email_cost = engine.config().communication.channel_costs["email"];

    let metrics = engine.run_ticks(12).unwrap();
    let inputs = engine.inputs();
    assert!((inputs.global_comm - 2.0 * email_effect).abs() < 1e-12,
        "Tick 11 intensity {} != 2 x {email_effect}", inputs.global_comm);
    assert!(inputs.high_urgency);
    assert!((inputs.tick_cost - 600.0 * email_cost).abs() < 1e-9,
        "Tick 11 cost {} != N x {email_cost}", inputs.tick_cost);

    assert!((metrics[11].communication_intensity - 2.0 * email_effect).abs() < 1e-12);
    for tick in 0..11 {
        assert_eq!(metrics[tick].communication_intensity, 0.0, "No mail on tick {tick}");
        assert_eq!(metrics[tick].total_cost, 0.0);
    }

    let sent: Vec<_> = engine
        .last_events()
        .iter()
        .filter(|e| matches!(e, SimEvent::CommunicationSent { urgent: true, .. }))
        .collect();
    assert_eq!(sent.len(), 1);
}

#[test]
fn urgency_raises_comm_sensitivity_after_the_week() {
    let mut engine = SimEngine::build("comm-sensitivity".into(), 42, email_only_config()).unwrap();
    engine.run_ticks(11).unwrap();
    assert!(engine.population().entities().iter().all(|e| e.comm_sensitivity() == 1.0));

    engine.step().unwrap();
    let growth = engine.config().behaviour.urgency_sensitivity_growth;
    for e in engine.population().entities() {
        assert!((e.comm_sensitivity() - growth).abs() < 1e-12);
    }
}

#[test]
fn second_year_urgent_week_still_applies_exactly_twice_the_effect() {
    let mut config = email_only_config();
    config.network.mean_degree = 0.0;
    config.audit.rates.clear();
    config.behaviour.decay_factor = 0.0;
    config.communication.channel_effects.insert("warning_letter".into(), 0.0);
    let email_effect = config.communication.channel_effects["email"];

    let mut engine = SimEngine::build("comm-year-two".into(), 42, config).unwrap();
    engine.run_ticks(63).unwrap();
    assert!(engine.population().entities().iter().all(|e| e.comm_sensitivity() > 1.0));
    let before: Vec<f64> = engine.population().entities().iter().map(|e| e.propensity()).collect();

    engine.step().unwrap();
    assert!(engine.inputs().high_urgency, "tick 63 is the year-2 urgent week");
    for (e, p0) in engine.population().entities().iter().zip(&before) {
        if *p0 >= 1.0 {
            continue;
        }
        let applied = (e.propensity() - p0) / (1.0 - p0);
        assert!((applied - 2.0 * email_effect).abs() < 1e-9,
            "entity {}: applied effect {applied} vs 2 x {email_effect}", e.id);
    }
}

#[test]
fn no_broadcast_after_the_deadline() {
    let mut engine = SimEngine::build_test("comm-after".into(), 42).unwrap();
    let metrics = engine.run_ticks(20).unwrap();
    for tick in 12..20 {
        assert_eq!(metrics[tick].communication_intensity, 0.0, "tick {tick}");
    }
    // Baseline schedule: 8 weeks out sends letter and email together.
    let expected = 0.003 + 0.008;
    assert!((metrics[4].communication_intensity - expected).abs() < 1e-12);
}

#[test]
fn warning_visits_flag_only_groups_below_target() {
    let mut engine = SimEngine::build_test("comm-warning".into(), 42).unwrap();
    let metrics = engine.run_ticks(36).unwrap();
    let target = engine.config().population.compliance_target;
    let means_before = &metrics[34].mean_by_group;

    let flagged: Vec<_> = engine
        .last_events()
        .iter()
        .filter_map(|e| match e {
            SimEvent::WarningVisitIssued { group, group_mean, reached, .. } => {
                Some((*group, *group_mean, *reached))
            }
            _ => None,
        })
        .collect();

    for (group, mean) in means_before {
        let was_flagged = flagged.iter().any(|(g, _, _)| g == group);
        assert_eq!(was_flagged, *mean < target,
            "Group {group} mean {mean:.4} flagged={was_flagged}");
    }
    for (group, mean, reached) in &flagged {
        assert!((mean - means_before[group]).abs() < 1e-12);
        assert_eq!(*reached, engine.population().group_count(*group));
        assert!(engine.inputs().sector_warnings.contains_key(group));
    }
    assert_eq!(engine.inputs().sector_warnings.len(), flagged.len());
}
