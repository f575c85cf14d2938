pub mod visit_generator;
