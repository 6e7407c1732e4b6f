//! The static route table and its dispatcher.
//!
//! Rules are evaluated in declaration order and the first rule whose prefix
//! is a literal prefix of the request path wins. Order is part of the
//! contract: `/api/users/profile` and `/api/users/public` overlap in their
//! first segments and must resolve to different rules. The table never
//! mutates at runtime.

/// Logical names of the downstream services the gateway can forward to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceName {
    /// Identity service: registration, login, logout, password reset.
    Auth,
    /// Work-item service: tasks, boards, projects, analytics, uploads.
    Tasks,
    /// Assistance service: AI suggestions and summaries.
    Ai,
    /// Profile service: private and public user profiles.
    Users,
    /// Realtime service: socket traffic.
    Realtime,
}

impl ServiceName {
    /// Human-readable name used in logs and the docs endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Tasks => "tasks",
            Self::Ai => "ai",
            Self::Users => "users",
            Self::Realtime => "realtime",
        }
    }
}

/// Authentication requirement of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// The request is forwarded without looking at credentials.
    None,
    /// A valid, non-revoked credential is mandatory; otherwise rejected.
    Required,
    /// A credential is honored when valid but the request is forwarded
    /// either way. Invalid or revoked credentials only suppress the claims.
    Optional,
}

/// One rule of the route table: a path prefix bound to a target service,
/// a path rewrite, and an authentication requirement.
///
/// The rewrite replaces the `strip` prefix of the matched path with
/// `replace`; `strip` is always a prefix of `prefix`, so every matched path
/// can be rewritten without further checks.
#[derive(Debug)]
pub struct RouteRule {
    /// Literal path prefix this rule matches.
    pub prefix: &'static str,
    /// Downstream service the request is forwarded to.
    pub service: ServiceName,
    /// Leading portion of the path removed before forwarding.
    pub strip: &'static str,
    /// Replacement for the stripped portion.
    pub replace: &'static str,
    /// Authentication requirement.
    pub auth: AuthMode,
}

/// The route table, in contract order.
pub const ROUTES: &[RouteRule] = &[
    RouteRule {
        prefix: "/api/auth",
        service: ServiceName::Auth,
        strip: "/api/auth",
        replace: "",
        auth: AuthMode::None,
    },
    RouteRule {
        prefix: "/api/users/profile",
        service: ServiceName::Users,
        strip: "/api/users",
        replace: "",
        auth: AuthMode::Required,
    },
    RouteRule {
        prefix: "/api/users/public",
        service: ServiceName::Users,
        strip: "/api/users/public",
        replace: "/public",
        auth: AuthMode::Optional,
    },
    RouteRule {
        prefix: "/api/tasks",
        service: ServiceName::Tasks,
        strip: "/api/tasks",
        replace: "",
        auth: AuthMode::Required,
    },
    RouteRule {
        prefix: "/api/boards",
        service: ServiceName::Tasks,
        strip: "/api/boards",
        replace: "/boards",
        auth: AuthMode::Required,
    },
    RouteRule {
        prefix: "/api/projects",
        service: ServiceName::Tasks,
        strip: "/api/projects",
        replace: "/projects",
        auth: AuthMode::Required,
    },
    RouteRule {
        prefix: "/api/ai",
        service: ServiceName::Ai,
        strip: "/api/ai",
        replace: "",
        auth: AuthMode::Required,
    },
    RouteRule {
        prefix: "/api/analytics",
        service: ServiceName::Tasks,
        strip: "/api/analytics",
        replace: "/analytics",
        auth: AuthMode::Required,
    },
    RouteRule {
        prefix: "/api/upload",
        service: ServiceName::Tasks,
        strip: "/api/upload",
        replace: "/upload",
        auth: AuthMode::Required,
    },
    RouteRule {
        prefix: "/socket.io",
        service: ServiceName::Realtime,
        strip: "",
        replace: "",
        auth: AuthMode::None,
    },
];

/// Returns the first rule whose prefix is a literal prefix of `path`,
/// or `None` when no rule matches. Pure lookup, no side effects.
pub fn match_route(path: &str) -> Option<&'static RouteRule> {
    ROUTES.iter().find(|rule| path.starts_with(rule.prefix))
}

impl RouteRule {
    /// Rewrites a matched request path for the target service.
    ///
    /// The query string is handled separately by the forwarder; only the
    /// path component is passed here. An empty rewrite result becomes `/`.
    pub fn rewrite(&self, path: &str) -> String {
        let rest = path.strip_prefix(self.strip).unwrap_or(path);
        let rewritten = format!("{}{}", self.replace, rest);
        if rewritten.is_empty() {
            "/".to_string()
        } else {
            rewritten
        }
    }
}
