// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! OpenAPI documentation for dojo-server, served at `/api/openapi.json`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dojo Server API",
        version = "1.0.0",
        description = "Dojo provisioning from external git repositories and dojo membership.",
        license(name = "Proprietary")
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    tags(
        (name = "dojo", description = "Dojo creation and membership"),
        (name = "health", description = "Health checks")
    ),
    paths(
        crate::routes::dojo::create_dojo,
        crate::routes::dojo::leave_dojo,
        crate::routes::dojo::join_dojo,
        crate::routes::health::health_check,
    ),
    components(schemas(
        dojo_server_api::CreateDojoRequest,
        dojo_server_api::CreateDojoResponse,
        dojo_server_api::LeaveDojoRequest,
        dojo_server_api::LeaveDojoResponse,
        dojo_server_api::JoinDojoRequest,
        dojo_server_api::JoinDojoResponse,
        dojo_server_api::DojoErrorResponse,
        dojo_server_api::HealthResponse,
        dojo_server_api::HealthStatus,
    ))
)]
pub struct ApiDoc;
