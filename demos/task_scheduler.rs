//! Demonstrates admission control and progress streaming on the task scheduler.

use llm_control_plane::{ResourceMultipliers, SubmitResult, TaskScheduler, Tier};

#[tokio::main]
async fn main() {
    let scheduler = TaskScheduler::new(ResourceMultipliers::default(), 1);

    let accepted = scheduler
        .submit("acme-corp", "user-1", "session-a", "summarize", 3, Tier::Standard)
        .await
        .unwrap();

    let task = match accepted {
        SubmitResult::Accepted { task } => task,
        SubmitResult::Rejected { reason } => {
            println!("rejected: {reason}");
            return;
        }
    };
    println!("submitted task {} (optimized {}s)", task.task_id, task.optimized_duration_s);

    let rejected = scheduler
        .submit("acme-corp", "user-1", "session-a", "summarize", 1, Tier::Standard)
        .await
        .unwrap();
    if let SubmitResult::Rejected { reason } = rejected {
        println!("second submit on same session rejected: {reason}");
    }

    let mut rx = scheduler.subscribe(task.task_id).unwrap();
    while let Ok(frame) = rx.recv().await {
        println!("progress: stage={:?} progress={}%", frame.current_stage, frame.progress);
        if frame.progress >= 100 {
            break;
        }
    }
}
