//! Test fixtures shared by the integration suites

use chaosspec::ServiceOptions;

pub struct TestFixtures;

impl TestFixtures {
    pub const CHAOS_FILE: &'static str = "tests/echo_chaos.rs";
    pub const PLAIN_FILE: &'static str = "tests/echo.rs";

    pub const ADMIN_IMAGE: &'static str = "shopify/toxiproxy";
    pub const ECHO_IMAGE: &'static str = "ealen/echo-server";
    pub const REDIS_IMAGE: &'static str = "redis:7";

    /// First host port handed out by the fake runtime
    pub const FIRST_HOST_PORT: u16 = 40000;

    pub fn echo() -> ServiceOptions {
        ServiceOptions::new(Self::ECHO_IMAGE).ports([80])
    }

    pub fn proxied_echo() -> ServiceOptions {
        Self::echo().proxy(true)
    }

    pub fn proxied_redis() -> ServiceOptions {
        ServiceOptions::new(Self::REDIS_IMAGE)
            .ports([6379])
            .proxy(true)
    }
}
