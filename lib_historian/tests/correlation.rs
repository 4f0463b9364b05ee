mod common;

use common::{config, start};
use lib_historian::protocol::envelope::{EventCountReply, TimeProbeReply, VersionReply};
use lib_historian::protocol::WireMessage;
use lib_historian::{ClientConfig, EventQuery, HistorianError, ServerVersion, TimeseriesQuery, MINIMUM_SERVER_VERSION};

#[tokio::test]
async fn test_out_of_order_responses_reach_their_callers() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let calls: Vec<_> = (0..5u32)
        .map(|i| {
            let client = h.client.clone();
            tokio::spawn(async move { client.event_count(EventQuery::new(f64::from(i), 100.0)).await })
        })
        .collect();

    let mut frames = Vec::new();
    for _ in 0..5 {
        frames.push(server.next().await);
    }
    // Answer in reverse order; each count is derived from the request itself.
    for frame in frames.iter().rev() {
        let start = match &frame.message {
            WireMessage::EventCountRequest(filter) => filter.start,
            other => panic!("unexpected {:?}", other),
        };
        server.reply(
            frame.request_id,
            WireMessage::EventCountResponse(EventCountReply {
                count: start as u64 * 10,
            }),
        );
    }

    for (i, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.unwrap().unwrap(), i as u64 * 10);
    }
}

#[tokio::test]
async fn test_ids_are_strictly_increasing() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let mut last = 0;
    for _ in 0..3 {
        let client = h.client.clone();
        let call = tokio::spawn(async move { client.time_range().await });
        let frame = server.next().await;
        assert!(frame.request_id.get() > last);
        last = frame.request_id.get();
        server.reply_error(frame.request_id, "empty archive");
        assert!(call.await.unwrap().is_err());
    }
}

#[tokio::test]
async fn test_error_frame_rejects_with_server_text() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.time_range().await });
    let frame = server.next().await;
    server.reply_error(frame.request_id, "archive offline: disk 3 unavailable");

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err, HistorianError::Server("archive offline: disk 3 unavailable".to_string()));
    assert_eq!(err.to_string(), "archive offline: disk 3 unavailable");
}

#[tokio::test]
async fn test_late_and_unknown_responses_are_dropped() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.version().await });
    let frame = server.next().await;
    let answer = WireMessage::VersionResponse(VersionReply {
        major: 1,
        minor: 4,
        patch: 2,
    });
    server.reply(frame.request_id, answer.clone());
    assert_eq!(call.await.unwrap().unwrap(), ServerVersion::new(1, 4, 2));

    // Duplicate answer, an answer nobody asked for, and a stray probe reply.
    server.reply(frame.request_id, answer.clone());
    server.reply(lib_historian::core::RequestId::new(9_999), answer.clone());
    server.reply(
        lib_historian::core::RequestId::new(9_998),
        WireMessage::TimeProbeResponse(TimeProbeReply { timestamp_ns: 1 }),
    );

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.version().await });
    let frame = server.next().await;
    server.reply(frame.request_id, answer);
    assert_eq!(call.await.unwrap().unwrap(), ServerVersion::new(1, 4, 2));
}

#[tokio::test]
async fn test_old_server_version_is_rejected() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.version().await });
    let frame = server.next().await;
    server.reply(
        frame.request_id,
        WireMessage::VersionResponse(VersionReply {
            major: 1,
            minor: 1,
            patch: 9,
        }),
    );

    match call.await.unwrap() {
        Err(HistorianError::IncompatibleVersion { found, minimum }) => {
            assert_eq!(found, ServerVersion::new(1, 1, 9));
            assert_eq!(minimum, MINIMUM_SERVER_VERSION);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_response_kind_is_reported() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.version().await });
    let frame = server.next().await;
    server.reply(frame.request_id, WireMessage::EventCountResponse(EventCountReply { count: 3 }));

    assert!(matches!(
        call.await.unwrap(),
        Err(HistorianError::UnexpectedResponse { ref expected, .. }) if expected == "version"
    ));
}

#[tokio::test]
async fn test_invalid_queries_never_reach_the_wire() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let err = h
        .client
        .timeseries(TimeseriesQuery::new(["flow"], 20.0, 10.0))
        .await
        .unwrap_err();
    assert!(matches!(err, HistorianError::Validation(_)));

    let err = h.client.events(EventQuery::new(0.0, f64::NAN)).await.unwrap_err();
    assert!(matches!(err, HistorianError::Validation(_)));

    let err = h.client.event_count(EventQuery::new(0.0, 1.0).with_limit(0)).await.unwrap_err();
    assert!(matches!(err, HistorianError::Validation(_)));

    let err = h.client.sender_tags(" ").await.unwrap_err();
    assert!(matches!(err, HistorianError::Validation(_)));

    assert!(server.try_next().await.is_none());
}

#[tokio::test]
async fn test_outstanding_cap_rejects_excess_requests() {
    let mut h = start(ClientConfig {
        max_outstanding: Some(2),
        ..config(false)
    });
    let mut server = h.accept().await;

    let first = {
        let client = h.client.clone();
        tokio::spawn(async move { client.time_range().await })
    };
    let second = {
        let client = h.client.clone();
        tokio::spawn(async move { client.time_range().await })
    };
    let a = server.next().await;
    let b = server.next().await;

    assert_eq!(h.client.version().await, Err(HistorianError::Overloaded(2)));

    server.reply_error(a.request_id, "no data");
    assert!(first.await.unwrap().is_err());

    let third = {
        let client = h.client.clone();
        tokio::spawn(async move { client.event_count(EventQuery::new(0.0, 1.0)).await })
    };
    let c = server.next().await;
    server.reply(c.request_id, WireMessage::EventCountResponse(EventCountReply { count: 7 }));
    assert_eq!(third.await.unwrap(), Ok(7));

    server.reply_error(b.request_id, "no data");
    assert!(second.await.unwrap().is_err());
}
