//! Raw Aggregator: replicate measurements → per-sample summary statistics.

use std::collections::HashMap;

use crate::data::model::{
    Channel, ChannelStats, Measurement, PerChannel, Quality, SampleAggregate,
};
use crate::registry::normalize_name;
use crate::stats;

/// Quality-flag policy for aggregation.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Minimum replicate count before a sample is flagged.
    pub min_replicates: usize,
    /// Allowed SD as a multiple of the channel's instrument precision.
    pub spread_tolerance: f64,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            min_replicates: 3,
            spread_tolerance: 1.0,
        }
    }
}

/// Group measurements by normalized sample identifier and session tag, then
/// compute per-channel mean, Bessel-corrected SD and replicate count.
///
/// The session tag is part of the grouping key: a standard measured once per
/// calibration session yields one aggregate per session, which is what the
/// per-session curve fit consumes. Groups are emitted in first-seen input
/// order, so output is deterministic and reproducible. Flagged groups are
/// carried forward, never dropped; only their flags differ. A channel no
/// measurement reached has no stats at all.
pub fn aggregate(measurements: &[Measurement], options: &AggregateOptions) -> Vec<SampleAggregate> {
    struct Group {
        id: String,
        key: String,
        session: Option<String>,
        values: PerChannel<Vec<f64>>,
    }

    let mut order: Vec<Group> = Vec::new();
    let mut index: HashMap<(String, Option<String>), usize> = HashMap::new();

    for m in measurements {
        let key = normalize_name(&m.sample);
        let at = *index
            .entry((key.clone(), m.session.clone()))
            .or_insert_with(|| {
                order.push(Group {
                    id: m.sample.clone(),
                    key,
                    session: m.session.clone(),
                    values: PerChannel::default(),
                });
                order.len() - 1
            });
        order[at].values.get_mut(m.channel).push(m.value);
    }

    let aggregates: Vec<SampleAggregate> = order
        .into_iter()
        .map(|group| {
            let mut channels = PerChannel::<Option<ChannelStats>>::default();
            for channel in Channel::ALL {
                let values = group.values.get(channel);
                *channels.get_mut(channel) = channel_stats(values, channel, options);
            }
            SampleAggregate {
                id: group.id,
                key: group.key,
                session: group.session,
                channels,
            }
        })
        .collect();

    log::debug!(
        "aggregated {} measurements into {} samples",
        measurements.len(),
        aggregates.len()
    );
    aggregates
}

fn channel_stats(
    values: &[f64],
    channel: Channel,
    options: &AggregateOptions,
) -> Option<ChannelStats> {
    let mean = stats::mean(values)?;
    let sd = stats::sample_sd(values);
    let quality = Quality {
        low_replicates: values.len() < options.min_replicates,
        high_spread: sd
            .map(|sd| sd >= options.spread_tolerance * channel.precision())
            .unwrap_or(false),
    };
    Some(ChannelStats {
        mean,
        sd,
        n: values.len(),
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn m(sample: &str, channel: Channel, value: f64) -> Measurement {
        Measurement {
            sample: sample.to_string(),
            channel,
            value,
            replicate: None,
            session: None,
        }
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let ms = vec![
            m("B", Channel::Delta18O, -1.0),
            m("A", Channel::Delta18O, -2.0),
            m("B", Channel::Delta18O, -1.2),
        ];
        let aggs = aggregate(&ms, &AggregateOptions::default());
        let ids: Vec<&str> = aggs.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["B", "A"]);
    }

    #[test]
    fn grouping_uses_the_registry_normalization() {
        let ms = vec![
            m("Ormea", Channel::Delta18O, -11.0),
            m("  ORMEA ", Channel::Delta18O, -12.0),
        ];
        let aggs = aggregate(&ms, &AggregateOptions::default());
        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs[0].key, "ORMEA");
        assert_eq!(aggs[0].id, "Ormea");
        assert_eq!(aggs[0].stats(Channel::Delta18O).unwrap().n, 2);
    }

    #[test]
    fn permuting_input_leaves_means_and_sds_unchanged() {
        let mut ms = vec![
            m("X", Channel::Delta18O, -20.1),
            m("X", Channel::Delta18O, -19.9),
            m("X", Channel::Delta18O, -20.0),
            m("Y", Channel::Delta2H, -77.5),
            m("Y", Channel::Delta2H, -78.1),
        ];
        let forward = aggregate(&ms, &AggregateOptions::default());
        ms.reverse();
        let backward = aggregate(&ms, &AggregateOptions::default());

        let fx = forward.iter().find(|a| a.key == "X").unwrap();
        let bx = backward.iter().find(|a| a.key == "X").unwrap();
        let fs = fx.stats(Channel::Delta18O).unwrap();
        let bs = bx.stats(Channel::Delta18O).unwrap();
        assert_relative_eq!(fs.mean, bs.mean, epsilon = 1e-12);
        assert_relative_eq!(fs.sd.unwrap(), bs.sd.unwrap(), epsilon = 1e-12);
        assert_eq!(fs.n, bs.n);
    }

    #[test]
    fn single_replicate_has_no_sd_and_is_flagged() {
        let aggs = aggregate(
            &[m("X", Channel::Delta18O, -5.0)],
            &AggregateOptions::default(),
        );
        let stats = aggs[0].stats(Channel::Delta18O).unwrap();
        assert_eq!(stats.n, 1);
        assert_eq!(stats.sd, None);
        assert!(stats.quality.low_replicates);
        assert!(!stats.quality.high_spread);
    }

    #[test]
    fn excessive_spread_is_flagged_per_channel_threshold() {
        // δ18O SD threshold is 0.08 ‰; these three replicates spread 0.2.
        let ms = vec![
            m("X", Channel::Delta18O, -5.0),
            m("X", Channel::Delta18O, -5.2),
            m("X", Channel::Delta18O, -4.8),
        ];
        let aggs = aggregate(&ms, &AggregateOptions::default());
        let stats = aggs[0].stats(Channel::Delta18O).unwrap();
        assert!(stats.quality.high_spread);
        assert!(!stats.quality.low_replicates);

        // The same numbers on δ2H stay well under its 0.8 ‰ threshold.
        let ms: Vec<Measurement> = ms
            .into_iter()
            .map(|mut m| {
                m.channel = Channel::Delta2H;
                m
            })
            .collect();
        let aggs = aggregate(&ms, &AggregateOptions::default());
        assert!(!aggs[0].stats(Channel::Delta2H).unwrap().quality.high_spread);
    }

    #[test]
    fn channel_without_measurements_has_no_stats() {
        let aggs = aggregate(
            &[m("X", Channel::Delta18O, -5.0)],
            &AggregateOptions::default(),
        );
        assert!(aggs[0].stats(Channel::Delta2H).is_none());
    }

    #[test]
    fn the_session_tag_is_part_of_the_grouping_key() {
        let tag = |sample: &str, session: &str, value: f64| {
            let mut m = m(sample, Channel::Delta18O, value);
            m.session = Some(session.to_string());
            m
        };
        let ms = vec![
            tag("NIVOLET", "cal1", -20.0),
            tag("NIVOLET", "cal2", -20.4),
            tag("NIVOLET", "cal1", -20.2),
        ];
        let aggs = aggregate(&ms, &AggregateOptions::default());

        // One aggregate per session, each pooling only its own replicates.
        assert_eq!(aggs.len(), 2);
        assert_eq!(aggs[0].session.as_deref(), Some("cal1"));
        assert_eq!(aggs[0].stats(Channel::Delta18O).unwrap().n, 2);
        assert_eq!(aggs[1].session.as_deref(), Some("cal2"));
        assert_eq!(aggs[1].stats(Channel::Delta18O).unwrap().n, 1);
    }
}
