mod common;

use common::{config, directory, event_batch, sender_tags, start};
use lib_historian::protocol::envelope::{SamplePoint, SeriesEntry, TimeseriesReply};
use lib_historian::protocol::WireMessage;
use lib_historian::{EventQuery, HistorianError, TimeseriesQuery};

#[tokio::test]
async fn test_unknown_node_costs_one_directory_refresh() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.timeseries(TimeseriesQuery::new(["flow", "pump_7"], 0.0, 10.0)).await });

    let frame = server.next().await;
    assert_eq!(frame.message, WireMessage::DirectoryRequest);
    server.reply(frame.request_id, directory(&[(1, "flow"), (2, "level")]));

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err, HistorianError::UnknownNode("pump_7".to_string()));
    assert!(err.to_string().contains("pump_7"));
    assert!(server.try_next().await.is_none(), "exactly one refresh and no data request");
}

#[tokio::test]
async fn test_missing_node_is_fetched_after_refresh() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let call = tokio::spawn(async move {
        client
            .timeseries(TimeseriesQuery::new(["level", "flow", "level"], 100.0, 200.0).with_max_points(50))
            .await
    });

    let listing = server.next().await;
    assert_eq!(listing.message, WireMessage::DirectoryRequest);
    server.reply(listing.request_id, directory(&[(1, "flow"), (2, "level")]));

    let frame = server.next().await;
    match &frame.message {
        WireMessage::TimeseriesRequest(body) => {
            assert_eq!(body.node_ids, vec![2, 1], "duplicates collapse, order kept");
            assert_eq!((body.start, body.end), (100.0, 200.0));
            assert_eq!(body.max_points, Some(50));
        }
        other => panic!("unexpected {:?}", other),
    }
    server.reply(
        frame.request_id,
        WireMessage::TimeseriesResponse(TimeseriesReply {
            series: vec![
                SeriesEntry {
                    node_id: 1,
                    points: vec![SamplePoint {
                        timestamp: 150.0,
                        value: 3.5,
                    }],
                },
                SeriesEntry {
                    node_id: 2,
                    points: vec![],
                },
            ],
        }),
    );

    let series = call.await.unwrap().unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].node, "flow");
    assert_eq!(series[0].samples[0].time, 150.0);
    assert_eq!(series[0].samples[0].value, 3.5);
    assert_eq!(series[1].node, "level");
}

#[tokio::test]
async fn test_known_nodes_skip_the_refresh() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let listing = tokio::spawn(async move { client.list_nodes().await });
    let frame = server.next().await;
    server.reply(frame.request_id, directory(&[(4, "temp"), (9, "flow")]));
    let nodes = listing.await.unwrap().unwrap();
    assert_eq!(nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(), vec!["temp", "flow"]);

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.timeseries(TimeseriesQuery::new(["flow"], 0.0, 1.0)).await });
    let frame = server.next().await;
    assert!(matches!(frame.message, WireMessage::TimeseriesRequest(ref b) if b.node_ids == vec![9]));
    server.reply(frame.request_id, WireMessage::TimeseriesResponse(TimeseriesReply { series: vec![] }));
    assert!(call.await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn test_event_tags_need_one_lookup_per_sender() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.events(EventQuery::new(0.0, 100.0)).await });

    let query = server.next().await;
    assert!(matches!(query.message, WireMessage::EventQueryRequest(_)));
    server.reply(
        query.request_id,
        event_batch(&[(10.0, "A", 1), (11.0, "A", 2), (12.0, "B", 1), (13.0, "B", 3)]),
    );

    let first = server.next().await;
    let second = server.next().await;
    let mut senders = Vec::new();
    for frame in [&first, &second] {
        match &frame.message {
            WireMessage::SenderTagRequest(body) => senders.push(body.sender.clone()),
            other => panic!("unexpected {:?}", other),
        }
    }
    senders.sort();
    assert_eq!(senders, vec!["A".to_string(), "B".to_string()]);
    assert!(server.try_next().await.is_none(), "exactly two tag lookups");

    let reply_for = |frame: &lib_historian::protocol::Frame| match &frame.message {
        WireMessage::SenderTagRequest(body) if body.sender == "A" => sender_tags("A", &[("site", "north")]),
        _ => sender_tags("B", &[("site", "south"), ("unit", "7")]),
    };

    server.reply(first.request_id, reply_for(&first));
    common::settle().await;
    assert!(!call.is_finished(), "events wait for every sender");

    server.reply(second.request_id, reply_for(&second));
    let events = call.await.unwrap().unwrap();
    assert_eq!(events.len(), 4);
    for event in &events {
        let tags = event.tags.as_ref().expect("tags attached");
        let site = &tags["site"].value;
        match event.sender.as_str() {
            "A" => assert_eq!(site, "north"),
            "B" => {
                assert_eq!(site, "south");
                assert_eq!(tags["unit"].value, "7");
            }
            other => panic!("unexpected sender {}", other),
        }
    }

    // Senders are cached for the lifetime of the client.
    let client = h.client.clone();
    let call = tokio::spawn(async move { client.events(EventQuery::new(0.0, 100.0)).await });
    let query = server.next().await;
    server.reply(query.request_id, event_batch(&[(20.0, "B", 9)]));
    let events = call.await.unwrap().unwrap();
    assert_eq!(events[0].tags.as_ref().map(|t| t.len()), Some(2));
    assert!(server.try_next().await.is_none());
}

#[tokio::test]
async fn test_failed_tag_lookup_leaves_tags_empty() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.events(EventQuery::new(0.0, 1.0)).await });
    let query = server.next().await;
    server.reply(query.request_id, event_batch(&[(0.5, "C", 4)]));

    let lookup = server.next().await;
    server.reply_error(lookup.request_id, "sender C unknown");

    let events = call.await.unwrap().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tags, None);
    assert_eq!(events[0].message, "event 4 from C");
}

#[tokio::test]
async fn test_concurrent_tag_requests_share_one_lookup() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let lookups: Vec<_> = (0..3)
        .map(|_| {
            let client = h.client.clone();
            tokio::spawn(async move { client.sender_tags("pump").await })
        })
        .collect();

    let frame = server.next().await;
    assert!(matches!(frame.message, WireMessage::SenderTagRequest(ref b) if b.sender == "pump"));
    assert!(server.try_next().await.is_none());
    server.reply(frame.request_id, sender_tags("pump", &[("area", "3")]));

    for lookup in lookups {
        let tags = lookup.await.unwrap().unwrap();
        assert_eq!(tags["area"].value, "3");
        assert_eq!(tags["area"].source, "config");
    }
}

#[tokio::test]
async fn test_empty_batch_needs_no_lookups() {
    let mut h = start(config(false));
    let mut server = h.accept().await;

    let client = h.client.clone();
    let call = tokio::spawn(async move { client.events(EventQuery::new(0.0, 1.0).with_senders(["X"])).await });
    let query = server.next().await;
    assert!(matches!(query.message, WireMessage::EventQueryRequest(ref f) if f.senders == vec!["X".to_string()]));
    server.reply(query.request_id, event_batch(&[]));
    assert!(call.await.unwrap().unwrap().is_empty());
    assert!(server.try_next().await.is_none());
}
