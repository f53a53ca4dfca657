/// Built-in engine adapter over whisper.cpp.
pub mod whisper;
