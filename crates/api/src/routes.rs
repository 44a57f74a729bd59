//! The dashboard's named routes.
//!
//! Order matters: the registry is first-match-wins, so literal routes such as
//! `/users/new` are registered before `/users/:id`.

use portcullis_auth::AuthRequirement;
use portcullis_routes::{ConfigError, GroupDefaults, RouteProps, RouteRegistry};

pub fn dashboard_routes() -> Result<RouteRegistry, ConfigError> {
    let mut b = RouteRegistry::builder();

    b.add("home", "/", RouteProps::inherit())?
        .add("health", "/health", RouteProps::inherit())?
        .add("status", "/status", RouteProps::inherit())?
        .add("logout", "/logout", RouteProps::inherit())?;

    {
        let guest_defaults = GroupDefaults::new(AuthRequirement::UnauthenticatedOnly);
        let mut guest = b.group(guest_defaults.tagged("guest"));
        guest
            .add("login", "/login", RouteProps::inherit())?
            .add("register", "/register", RouteProps::inherit())?
            .add(
                "password.reset",
                "/password/reset/:token",
                RouteProps::inherit(),
            )?;
    }

    {
        let dashboard_defaults = GroupDefaults::new(AuthRequirement::Authenticated);
        let mut dashboard = b.group(dashboard_defaults.tagged("dashboard"));
        dashboard
            .add("dashboard", "/dashboard", RouteProps::inherit())?
            .add("profile", "/profile", RouteProps::inherit())?
            .add("files", "/files/:path*", RouteProps::inherit())?
            .add("users", "/users", AuthRequirement::protected("users.read"))?
            .add(
                "users.new",
                "/users/new",
                AuthRequirement::protected("users.write"),
            )?
            .add(
                "users.show",
                "/users/:id",
                AuthRequirement::protected("users.read"),
            )?
            .add(
                "users.edit",
                "/users/:id/edit",
                AuthRequirement::protected("users.write"),
            )?
            .add("audit", "/audit", AuthRequirement::protected("audit.read"))?;

        let admin_defaults = GroupDefaults::new(AuthRequirement::elevated());
        let mut admin = dashboard.group(admin_defaults.tagged("admin"));
        admin
            .add("roles", "/roles", RouteProps::inherit())?
            .add("settings", "/settings", RouteProps::inherit())?
            .add("admin.routes", "/admin/routes", RouteProps::inherit())?;
    }

    b.add(
        "api",
        "/api/*",
        RouteProps::new(AuthRequirement::Authenticated).in_group("api"),
    )?;

    Ok(b.build())
}
