mod common;

use common::{context, context_with, lifecycle};
use hwcloud_config::ConfigError;
use hwcloud_resource::{Lifecycle, ResourceData, ResourceError};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INSTANCES: &str = "/v2/p-1/instances";
const INSTANCE: &str = "/v2/p-1/instances/i-1";
const FLAVOR: &str = "redis.ha.xu1.large.r2.2";

fn config(capacity: f64) -> Value {
    json!({
        "name": "cache",
        "engine": "Redis",
        "engine_version": "5.0",
        "capacity": capacity,
        "flavor": FLAVOR,
        "availability_zones": ["cn-north-4a"],
        "vpc_id": "vpc-1",
        "subnet_id": "subnet-1",
    })
}

fn instance(status: &str, capacity: f64) -> Value {
    instance_on_port(status, capacity, 6379)
}

fn instance_on_port(status: &str, capacity: f64, port: u16) -> Value {
    json!({
        "instance_id": "i-1",
        "name": "cache",
        "engine": "Redis",
        "engine_version": "5.0",
        "capacity": capacity,
        "spec_code": FLAVOR,
        "az_codes": ["cn-north-4a"],
        "vpc_id": "vpc-1",
        "subnet_id": "subnet-1",
        "security_group_id": "securityGroupId",
        "ip": "192.168.0.10",
        "port": port,
        "status": status,
    })
}

async fn mount_statuses(server: &MockServer, statuses: &[(&str, f64)]) {
    let ((last, last_capacity), first) = statuses.split_last().unwrap();
    for (status, capacity) in first {
        Mock::given(method("GET"))
            .and(path(INSTANCE))
            .respond_with(ResponseTemplate::new(200).set_body_json(instance(status, *capacity)))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(INSTANCE))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance(last, *last_capacity)))
        .mount(server)
        .await;
}

fn busy() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error_code": "DCS.4096",
        "error_msg": "the instance is being modified",
    }))
}

/// RUNNING が二回続くまで待ってから属性を読み込む
#[tokio::test]
async fn test_create_waits_for_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(INSTANCES))
        .and(body_json(json!({
            "name": "cache",
            "engine": "Redis",
            "engine_version": "5.0",
            "capacity": 2.0,
            "spec_code": FLAVOR,
            "az_codes": ["cn-north-4a"],
            "vpc_id": "vpc-1",
            "subnet_id": "subnet-1",
            "no_password_access": true,
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"instances": [{"instance_id": "i-1"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_statuses(&server, &[("CREATING", 2.0), ("RUNNING", 2.0)]).await;

    let data = lifecycle(&server, "huaweicloud_dcs_instance")
        .create(config(2.0))
        .await
        .unwrap();

    assert_eq!(data.id(), Some("i-1"));
    assert_eq!(data.attribute("status"), Some(&json!("RUNNING")));
    assert_eq!(data.attribute("region"), Some(&json!("cn-north-4")));
    assert_eq!(data.attribute("private_ip"), Some(&json!("192.168.0.10")));
    assert_eq!(data.attribute("security_group_id"), Some(&json!("")));
}

#[tokio::test]
async fn test_create_without_id_in_response_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(INSTANCES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = lifecycle(&server, "huaweicloud_dcs_instance")
        .create(config(2.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceError::Operation { .. }));
}

#[tokio::test]
async fn test_resize_retries_while_instance_is_busy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances/i-1/resize"))
        .respond_with(busy())
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances/i-1/resize"))
        .and(body_json(json!({"spec_code": FLAVOR, "new_capacity": 4.0})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    mount_statuses(&server, &[("EXTENDING", 2.0), ("RUNNING", 4.0)]).await;

    let current = ResourceData::new(config(2.0)).with_id("i-1");
    let data = lifecycle(&server, "huaweicloud_dcs_instance")
        .update(current, config(4.0))
        .await
        .unwrap();
    assert_eq!(data.attribute("capacity"), Some(&json!(4.0)));
}

#[tokio::test]
async fn test_other_bad_requests_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances/i-1/resize"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "DCS.4811",
            "error_msg": "invalid capacity",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let current = ResourceData::new(config(2.0)).with_id("i-1");
    let err = lifecycle(&server, "huaweicloud_dcs_instance")
        .update(current, config(3.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceError::Sdk(_)));
}

/// 説明を空にする場合も description を送る
#[tokio::test]
async fn test_modify_sends_empty_description() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(INSTANCE))
        .and(body_json(json!({"name": "cache-2", "description": ""})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    mount_statuses(&server, &[("RUNNING", 2.0)]).await;

    let mut prior = config(2.0);
    prior["description"] = json!("old");
    let current = ResourceData::new(prior).with_id("i-1");
    let mut desired = config(2.0);
    desired["name"] = json!("cache-2");

    lifecycle(&server, "huaweicloud_dcs_instance")
        .update(current, desired)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_waits_until_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(INSTANCE))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INSTANCE))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance("RUNNING", 2.0)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INSTANCE))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let current = ResourceData::new(config(2.0)).with_id("i-1");
    lifecycle(&server, "huaweicloud_dcs_instance")
        .delete(current)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_of_missing_instance_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(INSTANCE))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let current = ResourceData::new(config(2.0)).with_id("i-1");
    lifecycle(&server, "huaweicloud_dcs_instance")
        .delete(current)
        .await
        .unwrap();
}

/// オフセット方式で、ページが埋まっている間は次を取得する
#[tokio::test]
async fn test_list_pages_by_offset() {
    let server = MockServer::start().await;
    let full_page: Vec<Value> = (0..100)
        .map(|i| json!({"instance_id": format!("i-{i}"), "name": "cache", "status": "RUNNING"}))
        .collect();
    Mock::given(method("GET"))
        .and(path(INSTANCES))
        .and(query_param("name", "cache"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instances": full_page,
            "instance_num": 101,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INSTANCES))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instances": [{"instance_id": "i-100", "name": "cache", "capacity": 0, "capacity_minor": "0.125"}],
            "instance_num": 101,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = hwcloud_services::registry()
        .data_source("huaweicloud_dcs_instances")
        .unwrap();
    let result = source
        .read(&context(&server), &json!({"name": "cache"}))
        .await
        .unwrap();

    assert_eq!(result["region"], json!("cn-north-4"));
    assert_eq!(result["ids"].as_array().unwrap().len(), 101);
    assert_eq!(result["instances"][100]["capacity"], json!(0.125));
}

/// プロバイダーの企業プロジェクトを既定値として送る
#[tokio::test]
async fn test_create_uses_provider_enterprise_project() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(INSTANCES))
        .and(body_json(json!({
            "name": "cache",
            "engine": "Redis",
            "engine_version": "5.0",
            "capacity": 2.0,
            "spec_code": FLAVOR,
            "az_codes": ["cn-north-4a"],
            "vpc_id": "vpc-1",
            "subnet_id": "subnet-1",
            "enterprise_project_id": "eps-default",
            "no_password_access": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"instance_id": "i-1"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_statuses(&server, &[("RUNNING", 2.0)]).await;

    let ctx = context_with(&server, |config| {
        config.enterprise_project_id = Some("eps-default".to_string());
    });
    let adapter = hwcloud_services::registry()
        .resource("huaweicloud_dcs_instance")
        .unwrap();
    let data = Lifecycle::new(adapter, ctx)
        .create(config(2.0))
        .await
        .unwrap();
    assert_eq!(data.id(), Some("i-1"));
}

/// ポート変更は新しいポートが報告されるまで待つ
#[tokio::test]
async fn test_port_change_waits_for_new_port() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(INSTANCE))
        .and(body_json(json!({"name": "cache", "description": "", "port": 6380})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INSTANCE))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(instance_on_port("RUNNING", 2.0, 6379)),
        )
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INSTANCE))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(instance_on_port("RUNNING", 2.0, 6380)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let mut prior = config(2.0);
    prior["port"] = json!(6379);
    let mut desired = config(2.0);
    desired["port"] = json!(6380);

    let data = lifecycle(&server, "huaweicloud_dcs_instance")
        .update(ResourceData::new(prior).with_id("i-1"), desired)
        .await
        .unwrap();
    assert_eq!(data.attribute("port"), Some(&json!(6380)));
}

/// 拡張中・再起動中を経て RUNNING が二回続くまで待つ
#[tokio::test]
async fn test_resize_waits_through_extending_and_restarting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances/i-1/resize"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    for (status, capacity) in [("EXTENDING", 2.0), ("RESTARTING", 4.0), ("RUNNING", 4.0)] {
        Mock::given(method("GET"))
            .and(path(INSTANCE))
            .respond_with(ResponseTemplate::new(200).set_body_json(instance(status, capacity)))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
    }
    // Second consecutive RUNNING settles the wait, the last read loads attributes
    Mock::given(method("GET"))
        .and(path(INSTANCE))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance("RUNNING", 4.0)))
        .expect(2)
        .mount(&server)
        .await;

    let data = lifecycle(&server, "huaweicloud_dcs_instance")
        .update(ResourceData::new(config(2.0)).with_id("i-1"), config(4.0))
        .await
        .unwrap();
    assert_eq!(data.attribute("status"), Some(&json!("RUNNING")));
    assert_eq!(data.attribute("capacity"), Some(&json!(4.0)));
}

#[tokio::test]
async fn test_resize_fails_when_instance_reports_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances/i-1/resize"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    mount_statuses(&server, &[("EXTENDING", 2.0), ("ERROR", 2.0)]).await;

    let err = lifecycle(&server, "huaweicloud_dcs_instance")
        .update(ResourceData::new(config(2.0)).with_id("i-1"), config(4.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceError::Wait(_)));
}

/// データソースはコンテキストのリージョン指定に従い、引数の region が優先される
#[tokio::test]
async fn test_list_honours_context_region() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(INSTANCES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instances": [],
            "instance_num": 0,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = hwcloud_services::registry()
        .data_source("huaweicloud_dcs_instances")
        .unwrap();
    let ctx = context(&server).with_region("ap-southeast-1");

    let err = source.read(&ctx, &json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        ResourceError::Config(ConfigError::RegionMismatch { .. })
    ));

    let result = source
        .read(&ctx, &json!({"region": "cn-north-4"}))
        .await
        .unwrap();
    assert_eq!(result["region"], json!("cn-north-4"));
}
