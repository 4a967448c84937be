//! Built-in agent roles and tasks.

use parley_core::agent::AgentRole;

pub const LESSON_PLAN_MARKER: &str = "Lesson Plan Finalized";
pub const APPROVAL_MARKER: &str = "approved";

pub const CURRICULUM_CURATOR: &str = "curriculum_content_curator";
pub const ACTIVITY_DESIGNER: &str = "activity_assessment_designer";
pub const ENGAGEMENT_OPTIMIZER: &str = "classroom_engagement_optimizer";
pub const DECISION_AGENT: &str = "decision_agent";

pub const LESSON_PLANNER: &str = "LessonPlanner";
pub const EDUCATOR: &str = "Educator";

pub const DEFAULT_TOPIC: &str = "Photosynthesis";
pub const DEFAULT_REVIEW_TASK: &str =
    "Design a lesson plan on Incorporating Technology in the Classroom.";

pub fn lesson_plan_task(topic: &str) -> String {
    format!(
        "Search and curate educational resources, design activities and assessments, and provide \
         engagement strategies for the topic {topic}. Then generate a cohesive lesson plan."
    )
}

/// The four lesson-planning roles in speaking order. The decision agent
/// speaks last and is the only one allowed to finalize.
pub fn lesson_planning_team(model: &str) -> Vec<AgentRole> {
    vec![
        AgentRole::new(
            CURRICULUM_CURATOR,
            "You are the Curriculum Content Curator. You search and curate educational resources \
             (e.g., articles, videos, interactive simulations) aligned with the curriculum standards. \
             Do NOT provide any final lesson plan.",
            model,
        ),
        AgentRole::new(
            ACTIVITY_DESIGNER,
            "You are the Activity and Assessment Designer. You suggest classroom activities and \
             assessments tailored to different learning styles and objectives. \
             Do NOT provide any final lesson plan.",
            model,
        ),
        AgentRole::new(
            ENGAGEMENT_OPTIMIZER,
            "You are the Classroom Engagement Optimizer. You provide strategies and ideas to boost \
             student engagement, including interactive techniques and digital tool recommendations. \
             Do NOT provide any final lesson plan.",
            model,
        ),
        AgentRole::new(
            DECISION_AGENT,
            format!(
                "You are the Decision Agent. After reviewing the educational resources, activities, and \
                 engagement strategies from the other agents, you generate a cohesive lesson plan and \
                 adjust recommendations based on teacher feedback and classroom constraints. \
                 End your response with '{LESSON_PLAN_MARKER}' once you finalize the lesson plan."
            ),
            model,
        ),
    ]
}

/// Planner proposes, educator reviews until it approves.
pub fn review_team(model: &str) -> Vec<AgentRole> {
    vec![
        AgentRole::new(
            LESSON_PLANNER,
            "You are an expert lesson planner. Your task is to research and design a precise and \
             high-level lesson plan regarding a specific topic provided by an Educator. Your lesson \
             plan should include clear objectives, activities, assessments, resources, and timing for \
             each section. Ensure that your plan outline is actionable. Only provide a single proposal \
             per response. Consider suggestions when refining an idea.",
            model,
        ),
        AgentRole::new(
            EDUCATOR,
            format!(
                "You are an experienced educator. Your role is to review the lesson plan provided by the \
                 LessonPlanner and suggest modifications appropriate to various grade levels (elementary, \
                 high school, or college) or other relevant changes. The goal is to determine if the \
                 provided lesson plan is acceptable to use. If so, state that it is {APPROVAL_MARKER}. \
                 If not, provide insight on how to refine suggested copy without example."
            ),
            model,
        ),
    ]
}

pub fn course_planner(model: &str) -> AgentRole {
    AgentRole::new(
        "CoursePlanner",
        "You are an educational planning assistant. Please help the user by creating detailed course \
         and study plans based on the topic provided. Include different course titles, subtitles, and \
         a planner for one or more semesters.",
        model,
    )
}

/// Answers only from attached documents. Caller adds the file search tool.
pub fn file_search_agent(model: &str) -> AgentRole {
    AgentRole::new(
        "file-search-agent",
        "You are a helpful agent which provides answers only from the search data. \
         For other questions, please say 'I don't know'.",
        model,
    )
}

/// Education-only assistant. Caller adds the web search tool.
pub fn search_assistant(model: &str) -> AgentRole {
    AgentRole::new(
        "search-assistant",
        "You are a helpful assistant. Only answer questions related to education, courses, students, \
         curriculum, etc. If the question is outside these topics, politely inform the user that you \
         can only answer education-related questions.",
        model,
    )
}
