use httpmock::prelude::*;
use saslink::auth::submit_authorize_form;
use saslink::{SasClient, SasConfig, ServerType};

fn client(server: &MockServer, server_type: ServerType) -> SasClient {
    let config = SasConfig {
        server_url: server.base_url(),
        server_type,
        debug: false,
        ..SasConfig::default()
    };
    SasClient::new(config).unwrap()
}

const VIYA_LOGIN_PAGE: &str = r#"<html><body>
<form id="fm1" action="/SASLogon/login.do" method="post">
<input type="hidden" name="lt" value="LT-1"/>
<input type="hidden" name="execution" value="e1s1"/>
<input type="text" name="username" value=""/>
</form>
</body></html>"#;

#[tokio::test]
async fn test_form_login_round_trip() {
    let server = MockServer::start_async().await;
    let login_get = server
        .mock_async(|when, then| {
            when.method(GET).path("/SASLogon/login");
            then.status(200).body(VIYA_LOGIN_PAGE);
        })
        .await;
    let login_post = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/SASLogon/login.do")
                .body_includes("_service=default")
                .body_includes("username=sasdemo")
                .body_includes("password=secret")
                .body_includes("lt=LT-1")
                .body_includes("execution=e1s1");
            then.status(200).body("<p>You have signed in.</p>");
        })
        .await;

    let client = client(&server, ServerType::SasViya);
    let status = client.log_in("sasdemo", "secret").await.unwrap();

    assert!(status.is_logged_in);
    assert_eq!(status.user_name, "sasdemo");
    // one call for the session probe, one to learn the form
    login_get.assert_calls_async(2).await;
    login_post.assert_async().await;
}

#[tokio::test]
async fn test_sas9_login_url_drops_do_suffix() {
    let server = MockServer::start_async().await;
    let login_get = server
        .mock_async(|when, then| {
            when.method(GET).path("/SASLogon/login");
            then.status(200).body(
                r#"<form id="fm1" action="/SASLogon/login.do?service=web" method="post">
<input type="hidden" name="lt" value="LT-9"/>
</form>"#,
            );
        })
        .await;
    // the learned action loses its query and the .do suffix on SAS 9
    let login_post = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/SASLogon/login")
                .body_includes("username=ops")
                .body_includes("lt=LT-9");
            then.status(200).body("<p>You have signed in.</p>");
        })
        .await;

    let client = client(&server, ServerType::Sas9);
    let status = client.log_in("ops", "pw").await.unwrap();

    assert!(status.is_logged_in);
    login_get.assert_calls_async(2).await;
    login_post.assert_async().await;
}

#[tokio::test]
async fn test_check_session_reports_signed_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/SASLogon/login");
            then.status(200).body(VIYA_LOGIN_PAGE);
        })
        .await;

    let client = client(&server, ServerType::SasViya);
    let status = client.check_session().await.unwrap();

    assert!(!status.is_logged_in);
    assert_eq!(status.user_name, "");
}

#[tokio::test]
async fn test_log_out_hits_platform_endpoint() {
    let server = MockServer::start_async().await;
    let viya_logout = server
        .mock_async(|when, then| {
            when.method(GET).path("/SASLogon/logout.do");
            then.status(200).body("");
        })
        .await;

    let client = client(&server, ServerType::SasViya);
    client.log_out().await.unwrap();
    viya_logout.assert_async().await;

    let sas9_logout = server
        .mock_async(|when, then| {
            when.method(GET).path("/SASLogon/logout");
            then.status(200).body("");
        })
        .await;

    let client = self::client(&server, ServerType::Sas9);
    client.log_out().await.unwrap();
    sas9_logout.assert_async().await;
}

#[tokio::test]
async fn test_submit_authorize_form_grants_approvals() {
    let server = MockServer::start_async().await;
    let page = r#"<form action="/SASLogon/oauth/authorize" method="post">
<input type="hidden" name="X-Uaa-Csrf" value="abc"/>
<input type="checkbox" name="scope.approval.openid" value="false"/>
</form>"#;
    let authorize = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/SASLogon/oauth/authorize")
                .body_includes("X-Uaa-Csrf=abc")
                .body_includes("scope.approval.openid=true");
            then.status(200)
                .body(r#"<div class="infobox"><h4>authorization granted</h4></div>"#);
        })
        .await;

    let http = reqwest::Client::new();
    let body = submit_authorize_form(&http, &server.base_url(), page)
        .await
        .unwrap();

    authorize.assert_async().await;
    assert!(body.contains("infobox"));
}
