mod candidate_list;

pub use candidate_list::CandidateList;
