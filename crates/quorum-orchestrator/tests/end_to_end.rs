//! Full-stack flow: an objective is decomposed, assigned over the bus, each
//! task's prompt is routed to a model, and completion/failure feedback drives
//! the orchestrator forward.

use std::env;
use std::sync::{Arc, Once};

use quorum_agents::{AgentRecord, AgentType, InMemoryBus, MessageBus, MessageType, agent_queue};
use quorum_core::{CompletionRequest, OrchestratorConfig, TaskType};
use quorum_orchestrator::{Task, TaskOrchestrator};
use quorum_providers::MockAdapter;
use quorum_routing::{LlmRouter, ModelCatalog, RouteContext};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{EnvFilter, fmt};

static TRACING_INIT: Once = Once::new();

/// Initializes tracing for the test run (idempotent). Honors `RUST_LOG`.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_owned());
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_test_writer()
            .try_init();
    });
}

async fn bind_agent(
    bus: &InMemoryBus,
    agent_id: &str,
) -> UnboundedReceiver<quorum_agents::AgentMessage> {
    let queue = agent_queue(agent_id);
    let receiver = bus.declare_queue(&queue).await;
    bus.register_handler(agent_id, vec![format!("agent.{agent_id}")], &queue)
        .await
        .unwrap();
    receiver
}

#[tokio::test]
async fn objective_flows_from_assignment_to_completion() {
    init_tracing();
    let bus = Arc::new(InMemoryBus::new());
    let mut backend_queue = bind_agent(&bus, "backend-1").await;
    let mut docs_queue = bind_agent(&bus, "docs-1").await;

    let orchestrator = TaskOrchestrator::new(bus.clone(), OrchestratorConfig::default());
    orchestrator
        .register_agent(AgentRecord::new("backend-1", AgentType::Backend))
        .await;
    orchestrator
        .register_agent(AgentRecord::new("docs-1", AgentType::Docs))
        .await;

    let mut router = LlmRouter::new(ModelCatalog::with_defaults(), "llama-local").unwrap();
    let model = Arc::new(MockAdapter::new().with_default_response("fn main() {}"));
    router.register_adapter("claude-sonnet", model.clone());

    let api = Task::new("build API")
        .with_description("implement the tasks endpoint")
        .with_task_type(TaskType::Backend)
        .with_complexity(5);
    let docs = Task::new("document API")
        .with_description("write the endpoint reference")
        .with_task_type(TaskType::Documentation)
        .with_complexity(2)
        .with_dependencies(vec![api.id]);
    let api_id = api.id;
    orchestrator
        .submit_objective("ship the tasks API", vec![api, docs])
        .await
        .unwrap();

    // Only the dependency-free task is assigned, and it lands with the
    // backend specialist.
    let assigned = orchestrator.assign_ready_tasks().await;
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].1, "backend-1");
    let assignment = backend_queue.try_recv().unwrap();
    assert_eq!(assignment.message_type, MessageType::TaskAssignment);

    // The agent routes the task's prompt through the LLM router; a mid
    // complexity backend task goes to the mid-tier cloud model.
    orchestrator.mark_started(api_id).await.unwrap();
    let descriptor = quorum_core::TaskDescriptor::new("implement the tasks endpoint")
        .with_task_type(TaskType::Backend)
        .with_complexity(5);
    let request = CompletionRequest::new("implement the tasks endpoint");
    let response = router
        .execute("backend-1", &descriptor, &RouteContext::default(), &request)
        .await
        .unwrap();
    assert_eq!(response.content, "fn main() {}");
    assert_eq!(model.call_count(), 1);

    // Completing the backend task unlocks and assigns the docs task.
    let unlocked = orchestrator.handle_completion(api_id).await.unwrap();
    assert_eq!(unlocked.len(), 1);
    assert_eq!(unlocked[0].1, "docs-1");
    let assignment = docs_queue.try_recv().unwrap();
    assert_eq!(assignment.payload["title"], "document API");

    let summary = orchestrator.progress_summary().await;
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.assigned, 1);
    assert!(!summary.is_complete);
}
