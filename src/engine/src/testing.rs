use crate::sink::{HeartbeatReport, HeartbeatSink, OpportunitySink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use xa_types::Opportunity;

#[derive(Clone, Default)]
pub struct RecordingSink {
    opportunities: Arc<Mutex<Vec<Opportunity>>>,
    heartbeats: Arc<Mutex<Vec<HeartbeatReport>>>,
}

impl RecordingSink {
    pub fn opportunities(&self) -> Vec<Opportunity> {
        self.opportunities.lock().unwrap().clone()
    }

    pub fn heartbeats(&self) -> Vec<HeartbeatReport> {
        self.heartbeats.lock().unwrap().clone()
    }
}

impl OpportunitySink for RecordingSink {
    fn on_opportunity(&mut self, opportunity: &Opportunity) -> anyhow::Result<()> {
        self.opportunities.lock().unwrap().push(opportunity.clone());
        Ok(())
    }
}

impl HeartbeatSink for RecordingSink {
    fn on_heartbeat(&mut self, report: &HeartbeatReport) -> anyhow::Result<()> {
        self.heartbeats.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Fails or panics on demand.
#[derive(Clone)]
pub struct ScriptedSink {
    failures_left: Arc<AtomicUsize>,
    panics: bool,
    delivered: Arc<AtomicUsize>,
}

impl ScriptedSink {
    pub fn failing_first(count: usize) -> ScriptedSink {
        ScriptedSink {
            failures_left: Arc::new(AtomicUsize::new(count)),
            panics: false,
            delivered: Arc::default(),
        }
    }

    pub fn panicking() -> ScriptedSink {
        ScriptedSink {
            failures_left: Arc::default(),
            panics: true,
            delivered: Arc::default(),
        }
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    fn deliver(&self) -> anyhow::Result<()> {
        if self.panics {
            panic!("sink exploded");
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            anyhow::bail!("sink unavailable");
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl OpportunitySink for ScriptedSink {
    fn on_opportunity(&mut self, _: &Opportunity) -> anyhow::Result<()> {
        self.deliver()
    }
}

impl HeartbeatSink for ScriptedSink {
    fn on_heartbeat(&mut self, _: &HeartbeatReport) -> anyhow::Result<()> {
        self.deliver()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Opportunity(Opportunity),
    Heartbeat(HeartbeatReport),
}

/// Forwards everything it receives so async tests can await it.
#[derive(Clone)]
pub struct ChannelSink(pub UnboundedSender<Output>);

impl OpportunitySink for ChannelSink {
    fn on_opportunity(&mut self, opportunity: &Opportunity) -> anyhow::Result<()> {
        self.0.send(Output::Opportunity(opportunity.clone()))?;
        Ok(())
    }
}

impl HeartbeatSink for ChannelSink {
    fn on_heartbeat(&mut self, report: &HeartbeatReport) -> anyhow::Result<()> {
        self.0.send(Output::Heartbeat(report.clone()))?;
        Ok(())
    }
}
