//! End-to-end scenarios for the striping and view-management core, run
//! against `testkit::InMemoryBackend`:
//!
//! 1. bootstrap and first append
//! 2. growth/expansion with sealing of the previous stripe
//! 3. concurrent expanders racing to propose the same growth
//! 4. sequencer handoff between two instances
//! 5. a stale write is resolved by refreshing the current view
//! 6. trim advances `min_valid_position`

use std::sync::Arc;

use bytes::Bytes;

use stripelog::config::StriperConfig;
use stripelog::log_handle::LogHandle;
use stripelog::striper::Striper;
use stripelog::testkit::InMemoryBackend;
use stripelog::view::View;
use stripelog::Error;

async fn new_log(
    name: &str,
    secret: &str,
) -> (Arc<InMemoryBackend>, Arc<Striper<InMemoryBackend>>) {
    let backend = Arc::new(InMemoryBackend::new());
    let (hoid, prefix) = backend.create_log(name, View::create_initial()).await.unwrap();
    let striper = Striper::new(
        backend.clone(),
        hoid,
        prefix,
        secret.to_string(),
        StriperConfig::default(),
    )
    .await
    .unwrap();
    (backend, striper)
}

/// A second `Striper` opening the same named log, modeling a second
/// process sharing the backend.
async fn second_handle(
    backend: &Arc<InMemoryBackend>,
    name: &str,
    secret: &str,
) -> Arc<Striper<InMemoryBackend>> {
    let (hoid, prefix) = backend.open_log(name).await.unwrap();
    Striper::new(backend.clone(), hoid, prefix, secret.to_string(), StriperConfig::default())
        .await
        .unwrap()
}

mod bootstrap_and_first_append {
    use super::*;

    #[tokio::test]
    async fn creates_an_empty_view_and_appends_at_position_zero() {
        let (_backend, striper) = new_log("log-1", "secret").await;
        assert_eq!(striper.view().epoch(), 1);
        assert!(striper.view().object_map.is_empty());

        striper.propose_sequencer("secret".into()).await.unwrap();
        let log = LogHandle::new(striper.clone());

        let position = log.append(Bytes::from_static(b"first")).await.unwrap();
        assert_eq!(position, 0);
        assert_eq!(&log.read(0).await.unwrap()[..], b"first");
    }
}

mod growth_with_sealing {
    use super::*;

    #[tokio::test]
    async fn expanding_past_a_stripe_seals_the_previous_one() {
        let (backend, striper) = new_log("log-2", "secret").await;
        // default config: width 4, slots 10 -> first stripe covers [0, 39]
        striper.try_expand_view(0).await.unwrap();
        let first_stripe = striper.view().object_map.stripes()[0].clone();
        let epoch_after_first_stripe = striper.view().epoch();

        striper.try_expand_view(40).await.unwrap();
        assert_eq!(striper.view().object_map.stripes().len(), 2);
        assert!(striper.view().epoch() > epoch_after_first_stripe);

        // the first stripe's objects are sealed at the new epoch: a write
        // under the old epoch is now rejected as stale.
        let err = backend
            .write(
                &first_stripe.oids()[0],
                epoch_after_first_stripe,
                0,
                10,
                Bytes::from_static(b"x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleEpoch { .. }));

        // a write at the sealing epoch still succeeds.
        let current_epoch = striper.view().epoch();
        backend
            .write(&first_stripe.oids()[0], current_epoch, 0, 10, Bytes::from_static(b"x"))
            .await
            .unwrap();
    }
}

mod concurrent_expanders {
    use super::*;

    #[tokio::test]
    async fn racing_expansions_converge_on_one_grown_view() {
        let (_backend, striper) = new_log("log-3", "secret").await;

        // Two concurrent callers both try to grow the map to cover position
        // 0; exactly one proposal wins, the other observes the conflict and
        // refreshes instead of surfacing an error.
        let (first, second) = tokio::join!(
            striper.try_expand_view(0),
            striper.try_expand_view(0),
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(striper.view().object_map.stripes().len(), 1);
        assert!(striper.view().object_map.map_stripe(0).is_some());
    }
}

mod sequencer_handoff {
    use super::*;

    #[tokio::test]
    async fn a_second_instance_takes_over_sequencing_from_the_first() {
        let (backend, striper_a) = new_log("log-4", "secret-a").await;
        striper_a.propose_sequencer("secret-a".into()).await.unwrap();
        let log_a = LogHandle::new(striper_a.clone());
        let p0 = log_a.append(Bytes::from_static(b"from-a")).await.unwrap();
        assert_eq!(p0, 0);

        let striper_b = second_handle(&backend, "log-4", "secret-b").await;
        // striper_b doesn't have a local sequencer until it proposes one.
        assert!(striper_b.view().seq.is_none());

        striper_b.propose_sequencer("secret-b".into()).await.unwrap();
        assert!(striper_b.view().seq.is_some());

        let log_b = LogHandle::new(striper_b.clone());
        let p1 = log_b.append(Bytes::from_static(b"from-b")).await.unwrap();
        // sequencing continues from the prior tail, not from zero again.
        assert_eq!(p1, p0 + 1);
    }
}

mod stale_write_triggers_refresh {
    use super::*;

    #[tokio::test]
    async fn update_current_view_resolves_a_stale_epoch_signal() {
        let (backend, striper_a) = new_log("log-5", "secret").await;
        striper_a.try_expand_view(0).await.unwrap();

        let striper_b = second_handle(&backend, "log-5", "secret").await;
        assert_eq!(striper_b.view().epoch(), striper_a.view().epoch());

        // striper_a grows past stripe 0, sealing its objects at a new
        // epoch; striper_b doesn't see this yet.
        striper_a.try_expand_view(40).await.unwrap();
        assert!(striper_a.view().epoch() > striper_b.view().epoch());

        // striper_b tries to write under its now-stale epoch and is
        // rejected.
        let (oid, _) = striper_b.map(0).unwrap();
        let stale_epoch = striper_b.view().epoch();
        let stale_result = backend
            .write(&oid, stale_epoch, 0, 10, Bytes::from_static(b"late"))
            .await;
        assert!(matches!(stale_result, Err(Error::StaleEpoch { .. })));

        // refreshing picks up the newer view and the same write now
        // succeeds at the current epoch.
        striper_b.update_current_view(stale_epoch).await.unwrap();
        assert_eq!(striper_b.view().epoch(), striper_a.view().epoch());
        backend
            .write(&oid, striper_b.view().epoch(), 0, 10, Bytes::from_static(b"late"))
            .await
            .unwrap();
    }
}

mod trim_advances_min_valid_position {
    use super::*;

    #[tokio::test]
    async fn trimming_an_entry_raises_the_floor() {
        let (_backend, striper) = new_log("log-6", "secret").await;
        striper.propose_sequencer("secret".into()).await.unwrap();
        let log = LogHandle::new(striper.clone());

        let position = log.append(Bytes::from_static(b"to-trim")).await.unwrap();
        assert_eq!(striper.view().min_valid_position, 0);

        log.trim(position).await.unwrap();
        assert_eq!(striper.view().min_valid_position, position + 1);

        let err = log.read(position).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEntry { .. }));
    }
}
