#![no_main]

use libfuzzer_sys::fuzz_target;
use tracekeeper::config::AgentConfig;
use tracekeeper::pool_factory::PoolFactory;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Anything that parses and validates must yield usable thresholds and pools
        if let Ok(config) = AgentConfig::from_toml_str(input) {
            let cpu = config.circuit_breaker.cpu_thresholds();
            assert!(cpu.consecutive >= 1);
            assert!(cpu.relief <= cpu.stress);
            let factory = PoolFactory::new(&config.pools);
            let span = factory.span_pool().create_instance();
            factory.span_pool().recycle(span);
        }
    }
});
