// src/load_balancer/mod.rs
mod algorithm;
mod least_connections;
mod round_robin;

pub use algorithm::LoadBalancer;
pub use least_connections::LeastConnectionsBalancer;
pub use round_robin::RoundRobinBalancer;

use crate::config::Strategy;

pub fn create_load_balancer(strategy: Strategy) -> Box<dyn LoadBalancer> {
    match strategy {
        Strategy::RoundRobin => Box::new(RoundRobinBalancer::new()),
        Strategy::LeastConnections => Box::new(LeastConnectionsBalancer::new()),
    }
}
