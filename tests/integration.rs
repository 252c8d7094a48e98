//! Integration tests for ua-dispatch.
//!
//! These tests drive the dispatcher the way a transport would: encoded
//! bytes in, encoded bytes out, with schedulers plugged in at the seam.

use std::sync::Arc;
use std::time::Duration;

use ua_dispatch::bridge::{Completion, PendingOperation};
use ua_dispatch::channel::{EndpointDescription, SecureChannelContext};
use ua_dispatch::codec::{type_ids, MessageContext};
use ua_dispatch::protocol::{
    build_frame, flags, DiagnosticsMask, Header, RequestHeader, ServiceRequest, HEADER_SIZE,
};
use ua_dispatch::{DispatchError, RequestContext, RequestDispatcher, ServiceError, StatusCode};

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct ReadValueId {
    node_id: String,
    attribute_id: u32,
}

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct DataValue {
    value: f64,
    status: StatusCode,
}

fn endpoint() -> EndpointDescription {
    EndpointDescription::new("opc.tcp://plant-7:4840")
}

fn read_service() -> ua_dispatch::DispatcherBuilder {
    RequestDispatcher::builder().service(
        type_ids::READ_REQUEST,
        "ReadRequest",
        |nodes: Vec<ReadValueId>, _ctx: RequestContext| async move {
            let values = nodes
                .iter()
                .map(|n| DataValue {
                    value: f64::from(n.attribute_id),
                    status: StatusCode::GOOD,
                })
                .collect::<Vec<_>>();
            Ok::<_, DispatchError>(values)
        },
    )
}

fn encoded_read(handle: u32, header: RequestHeader) -> Vec<u8> {
    let nodes = vec![ReadValueId {
        node_id: "ns=2;s=Boiler.Temperature".to_string(),
        attribute_id: 13,
    }];
    let request = ServiceRequest::with_body(
        type_ids::READ_REQUEST,
        RequestHeader {
            request_handle: handle,
            ..header
        },
        &nodes,
    )
    .unwrap();
    MessageContext::standard()
        .encode_request(&request, 0)
        .unwrap()
        .to_vec()
}

/// Handler result comes back in an envelope carrying the inbound channel id.
#[tokio::test]
async fn test_encoded_request_returns_handler_response() {
    let dispatcher = read_service().build().unwrap();
    let payload = encoded_read(100, RequestHeader::new(0));

    let reply = dispatcher.dispatch_encoded(&payload, 7, endpoint()).await;

    let (header, response) = MessageContext::standard().decode_response(&reply).unwrap();
    assert_eq!(header.channel_id, 7);
    assert_eq!(header.type_id, type_ids::READ_REQUEST);
    assert_eq!(header.flags, flags::RESPONSE);
    assert_eq!(response.request_handle(), 100);
    assert_eq!(response.service_result(), StatusCode::GOOD);
    assert_eq!(
        response.decode_body::<Vec<DataValue>>().unwrap(),
        vec![DataValue {
            value: 13.0,
            status: StatusCode::GOOD
        }]
    );
}

#[tokio::test]
async fn test_unregistered_type_faults_with_handle() {
    let dispatcher = read_service().build().unwrap();
    let request =
        ServiceRequest::with_body(type_ids::HISTORY_READ_REQUEST, RequestHeader::new(42), &())
            .unwrap();
    let payload = MessageContext::standard().encode_request(&request, 0).unwrap();

    let reply = dispatcher.dispatch_encoded(&payload, 3, endpoint()).await;

    let (header, fault) = MessageContext::standard().decode_response(&reply).unwrap();
    assert_eq!(header.channel_id, 3);
    assert_eq!(fault.service_result(), StatusCode::BAD_SERVICE_UNSUPPORTED);
    assert_eq!(fault.request_handle(), 42);
    assert!(fault.body.is_empty());
}

#[tokio::test]
async fn test_corrupted_bytes_return_encoded_fault() {
    let dispatcher = read_service().build().unwrap();

    // truncated before the header ends
    let reply = dispatcher
        .dispatch_encoded(&[0x00, 0x00, 0x02], 19, endpoint())
        .await;
    let (header, fault) = MessageContext::fallback().decode_response(&reply).unwrap();
    assert_eq!(header.channel_id, 19);
    assert_eq!(fault.service_result(), StatusCode::BAD_DECODING_ERROR);
    assert_eq!(fault.request_handle(), 0);

    // valid header, garbage body
    let junk = [0xc1u8; 8];
    let frame = build_frame(
        &Header::new(type_ids::READ_REQUEST, flags::REQUEST, 0, 0),
        &junk,
    );
    let reply = dispatcher.dispatch_encoded(&frame, 19, endpoint()).await;
    let (header, fault) = MessageContext::fallback().decode_response(&reply).unwrap();
    assert_eq!(header.type_id, type_ids::READ_REQUEST);
    assert_eq!(fault.service_result(), StatusCode::BAD_DECODING_ERROR);
    assert_eq!(fault.request_handle(), 0);
    assert!(fault.header.service_diagnostics.is_none());
}

#[tokio::test]
async fn test_header_length_mismatch_is_decoding_fault() {
    let dispatcher = read_service().build().unwrap();
    let mut payload = encoded_read(5, RequestHeader::new(0));
    payload.truncate(HEADER_SIZE + 2);

    let reply = dispatcher.dispatch_encoded(&payload, 1, endpoint()).await;

    let (_, fault) = MessageContext::fallback().decode_response(&reply).unwrap();
    assert_eq!(fault.service_result(), StatusCode::BAD_DECODING_ERROR);
}

/// Legacy callback with no response and a good status: the bridge runs the handler.
#[tokio::test]
async fn test_scheduler_callback_good_invokes_handler() {
    let scheduler = |op: PendingOperation| {
        std::thread::spawn(move || op.complete(Completion::from_callback(None, StatusCode::GOOD)));
    };
    let dispatcher = read_service()
        .scheduler(Arc::new(scheduler))
        .build()
        .unwrap();
    let payload = encoded_read(12, RequestHeader::new(0));

    let reply = dispatcher.dispatch_encoded(&payload, 4, endpoint()).await;

    let (_, response) = MessageContext::standard().decode_response(&reply).unwrap();
    assert_eq!(response.service_result(), StatusCode::GOOD);
    assert_eq!(response.request_handle(), 12);
    assert_eq!(response.decode_body::<Vec<DataValue>>().unwrap().len(), 1);
}

#[tokio::test]
async fn test_scheduler_callback_bad_status_is_returned() {
    let scheduler = |op: PendingOperation| {
        op.complete(Completion::from_callback(
            None,
            StatusCode::BAD_TOO_MANY_OPERATIONS,
        ))
    };
    let dispatcher = read_service()
        .scheduler(Arc::new(scheduler))
        .build()
        .unwrap();
    let payload = encoded_read(13, RequestHeader::new(0));

    let reply = dispatcher.dispatch_encoded(&payload, 4, endpoint()).await;

    let (_, fault) = MessageContext::standard().decode_response(&reply).unwrap();
    assert_eq!(fault.service_result(), StatusCode::BAD_TOO_MANY_OPERATIONS);
    assert_eq!(fault.request_handle(), 13);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_that_never_completes_times_out() {
    let parked = Arc::new(std::sync::Mutex::new(Vec::new()));
    let scheduler = {
        let parked = Arc::clone(&parked);
        move |op: PendingOperation| parked.lock().unwrap().push(op)
    };
    let dispatcher = read_service()
        .default_timeout(Duration::from_secs(2))
        .scheduler(Arc::new(scheduler))
        .build()
        .unwrap();
    let payload = encoded_read(21, RequestHeader::new(0));
    let started = tokio::time::Instant::now();

    let reply = dispatcher.dispatch_encoded(&payload, 4, endpoint()).await;

    assert_eq!(started.elapsed(), Duration::from_secs(2));
    let (_, fault) = MessageContext::standard().decode_response(&reply).unwrap();
    assert_eq!(fault.service_result(), StatusCode::BAD_TIMEOUT);
    assert_eq!(fault.request_handle(), 21);

    // completing after the timeout changes nothing
    let op = parked.lock().unwrap().pop().unwrap();
    op.complete(Completion::Invoke);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_channels_are_isolated() {
    let dispatcher = RequestDispatcher::builder()
        .service(
            type_ids::BROWSE_REQUEST,
            "BrowseRequest",
            |delay_ms: u64, ctx: RequestContext| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let ambient = SecureChannelContext::require_current()?;
                Ok::<_, DispatchError>((ambient.channel_id(), ctx.channel().channel_id()))
            },
        )
        .build()
        .unwrap();

    let tasks: Vec<_> = (0..64u32)
        .map(|channel_id| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let request = ServiceRequest::with_body(
                    type_ids::BROWSE_REQUEST,
                    RequestHeader::new(channel_id),
                    &u64::from(channel_id % 5),
                )
                .unwrap();
                let channel = SecureChannelContext::new(channel_id, endpoint());
                let response = dispatcher.dispatch(request, channel).await;
                (channel_id, response.decode_body::<(u32, u32)>().unwrap())
            })
        })
        .collect();

    for task in tasks {
        let (expected, (ambient, explicit)) = task.await.unwrap();
        assert_eq!(ambient, expected);
        assert_eq!(explicit, expected);
    }
}

#[tokio::test]
async fn test_fault_string_table_has_no_duplicates() {
    let dispatcher = RequestDispatcher::builder()
        .service(
            type_ids::WRITE_REQUEST,
            "WriteRequest",
            |_: (), _ctx: RequestContext| async {
                let cause = ServiceError::new(StatusCode::BAD_TIMEOUT)
                    .with_text("en-US", "Device did not answer");
                let err = ServiceError::new(StatusCode::BAD_COMMUNICATION_ERROR)
                    .with_text("en-US", "Device did not answer")
                    .with_inner(cause);
                Err::<(), _>(DispatchError::Service(err))
            },
        )
        .build()
        .unwrap();
    let header = RequestHeader::new(30).with_diagnostics(DiagnosticsMask::ALL);
    let request = ServiceRequest::with_body(type_ids::WRITE_REQUEST, header, &()).unwrap();
    let channel = SecureChannelContext::new(1, endpoint());

    let fault = dispatcher.dispatch(request, channel).await;

    assert_eq!(fault.service_result(), StatusCode::BAD_COMMUNICATION_ERROR);
    let table = &fault.header.string_table;
    let mut unique = table.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), table.len());
    assert!(table.contains(&"Device did not answer".to_string()));
    assert!(table.contains(&"en-US".to_string()));

    let diagnostics = fault.header.service_diagnostics.unwrap();
    let inner = diagnostics.inner_diagnostic_info.unwrap();
    assert_eq!(inner.localized_text, diagnostics.localized_text);
    assert_eq!(diagnostics.inner_status_code, Some(StatusCode::BAD_TIMEOUT));
}

#[tokio::test]
async fn test_unexpected_error_hides_detail_without_additional_info() {
    let dispatcher = RequestDispatcher::builder()
        .service(
            type_ids::CALL_REQUEST,
            "CallRequest",
            |_: (), _ctx: RequestContext| async {
                Err::<(), _>(DispatchError::from(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "/var/lib/ua/methods.db locked",
                )))
            },
        )
        .build()
        .unwrap();

    for (mask, leaks) in [
        (DiagnosticsMask::SERVICE_SYMBOLIC_ID_AND_TEXT, false),
        (DiagnosticsMask::SERVICE_ALL, true),
    ] {
        let header = RequestHeader::new(31).with_diagnostics(mask);
        let request = ServiceRequest::with_body(type_ids::CALL_REQUEST, header, &()).unwrap();
        let fault = dispatcher
            .dispatch(request, SecureChannelContext::new(1, endpoint()))
            .await;

        assert_eq!(fault.service_result(), StatusCode::BAD_UNEXPECTED_ERROR);
        let table = &fault.header.string_table;
        assert!(table.contains(&"An unexpected error occurred".to_string()));
        let info = fault.header.service_diagnostics.unwrap().additional_info;
        assert_eq!(
            info.is_some_and(|i| i.contains("methods.db locked")),
            leaks
        );
    }
}

#[tokio::test]
async fn test_worker_pool_from_json_config() {
    let config = ua_dispatch::DispatcherConfig::from_json(
        r#"{ "scheduler_workers": 2, "scheduler_queue_capacity": 16 }"#,
    )
    .unwrap();
    let dispatcher = read_service()
        .config(config)
        .worker_pool()
        .build()
        .unwrap();

    let replies = dispatch_many(&dispatcher, 8).await;

    for (handle, reply) in replies.into_iter().enumerate() {
        let (_, response) = MessageContext::standard().decode_response(&reply).unwrap();
        assert_eq!(response.request_handle(), handle as u32);
        assert_eq!(response.service_result(), StatusCode::GOOD);
    }
}

async fn dispatch_many(dispatcher: &RequestDispatcher, count: u32) -> Vec<bytes::Bytes> {
    let tasks: Vec<_> = (0..count)
        .map(|handle| {
            let dispatcher = dispatcher.clone();
            let payload = encoded_read(handle, RequestHeader::new(0));
            tokio::spawn(async move { dispatcher.dispatch_encoded(&payload, 9, endpoint()).await })
        })
        .collect();
    let mut replies = Vec::with_capacity(tasks.len());
    for task in tasks {
        replies.push(task.await.unwrap());
    }
    replies
}
